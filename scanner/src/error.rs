//! Scanner error types.
//!
//! File- and archive-level errors never escape the scanning stage; they are
//! accumulated on the bundle as data and surfaced in the eventual feedback
//! artifact and logs.

use std::fmt;

use thiserror::Error;

/// Why a single file could not be turned into context content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// No extractor claims the file's format.
    Unsupported,
    /// The file claims a supported format but its contents are broken.
    Corrupt,
    /// The file could not be read at all.
    Io,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::Unsupported => "unsupported",
            ExtractionErrorKind::Corrupt => "corrupt",
            ExtractionErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file extraction failure. Non-fatal: recorded on the bundle.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: ExtractionErrorKind::Unsupported,
            message: message.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self {
            kind: ExtractionErrorKind::Corrupt,
            message: message.into(),
        }
    }

    pub fn io(message: impl fmt::Display) -> Self {
        Self {
            kind: ExtractionErrorKind::Io,
            message: message.to_string(),
        }
    }
}

/// Per-archive expansion failure. Non-fatal: the scan continues without that
/// archive's contents.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to open archive: {0}")]
    Corrupt(String),

    #[error("archive entry escapes the extraction directory: {0}")]
    UnsafeEntry(String),

    #[error("uncompressed contents exceed the {limit} byte cap")]
    TooLarge { limit: u64 },

    #[error("archive nesting deeper than {max_depth} levels")]
    DepthExceeded { max_depth: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal failure recorded while assembling a bundle.
#[derive(Debug, Error)]
pub enum ScanFailure {
    #[error("{relative_path}: {error}")]
    Extraction {
        relative_path: String,
        error: ExtractionError,
    },

    #[error("{relative_path}: {error}")]
    Archive {
        relative_path: String,
        error: ArchiveError,
    },
}
