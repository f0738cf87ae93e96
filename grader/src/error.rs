//! Grading error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// What went wrong while talking to the grading model. Fatal to its task only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingErrorKind {
    RateLimited,
    Timeout,
    Auth,
    Malformed,
}

impl GradingErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingErrorKind::RateLimited => "rate-limited",
            GradingErrorKind::Timeout => "timeout",
            GradingErrorKind::Auth => "auth",
            GradingErrorKind::Malformed => "malformed",
        }
    }

    /// Transient failures are worth exactly one retry; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GradingErrorKind::RateLimited | GradingErrorKind::Timeout
        )
    }
}

impl fmt::Display for GradingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct GradingError {
    pub kind: GradingErrorKind,
    pub message: String,
}

impl GradingError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: GradingErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: GradingErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: GradingErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: GradingErrorKind::Malformed,
            message: message.into(),
        }
    }
}

/// Run-level configuration failures. These abort before any task starts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("data root {} is not a directory", .0.display())]
    DataRootMissing(PathBuf),

    #[error("failed to read rubric {}: {source}", .path.display())]
    Rubric {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create output root {}: {source}", .path.display())]
    OutputRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to enumerate submissions: {0}")]
    Discovery(std::io::Error),

    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}
