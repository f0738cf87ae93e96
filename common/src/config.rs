//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables (and a `.env`
//! file when present). It provides thread-safe access and mutation for testing
//! or overrides in runtime environments.

use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub grading_timeout_secs: u64,
    pub default_concurrency: usize,
    pub max_archive_depth: u32,
    pub max_archive_unpacked_bytes: u64,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Every value has a default, so a bare environment still produces a
    /// usable config (the Gemini key defaults to empty and is validated at
    /// client construction, not here). Panics only on unparseable numbers.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "grader".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "grader.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "true".into()) == "true",
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".into()),
            grading_timeout_secs: env::var("GRADING_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".into())
                .parse()
                .expect("GRADING_TIMEOUT_SECS must be an integer"),
            default_concurrency: env::var("GRADER_CONCURRENCY")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .expect("GRADER_CONCURRENCY must be an integer"),
            max_archive_depth: env::var("MAX_ARCHIVE_DEPTH")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .expect("MAX_ARCHIVE_DEPTH must be an integer"),
            max_archive_unpacked_bytes: env::var("MAX_ARCHIVE_UNPACKED_BYTES")
                .unwrap_or_else(|_| (512u64 * 1024 * 1024).to_string())
                .parse()
                .expect("MAX_ARCHIVE_UNPACKED_BYTES must be an integer"),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().unwrap();
            *guard = AppConfig::from_env();
        }
    }

    /// Generic internal setter for any field in the config.
    ///
    /// Used by public per-field setter methods.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_project_name(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.project_name = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_gemini_api_key(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.gemini_api_key = value.into());
    }

    pub fn set_gemini_model(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.gemini_model = value.into());
    }

    pub fn set_grading_timeout_secs(value: u64) {
        AppConfig::set_field(|cfg| cfg.grading_timeout_secs = value);
    }

    pub fn set_default_concurrency(value: usize) {
        AppConfig::set_field(|cfg| cfg.default_concurrency = value);
    }

    pub fn set_max_archive_depth(value: u32) {
        AppConfig::set_field(|cfg| cfg.max_archive_depth = value);
    }

    pub fn set_max_archive_unpacked_bytes(value: u64) {
        AppConfig::set_field(|cfg| cfg.max_archive_unpacked_bytes = value);
    }
}

// Free accessors so call sites read as `config::gemini_api_key()`.

pub fn env() -> String {
    AppConfig::global().env.clone()
}

pub fn project_name() -> String {
    AppConfig::global().project_name.clone()
}

pub fn log_level() -> String {
    AppConfig::global().log_level.clone()
}

pub fn log_file() -> String {
    AppConfig::global().log_file.clone()
}

pub fn log_to_stdout() -> bool {
    AppConfig::global().log_to_stdout
}

pub fn gemini_api_key() -> String {
    AppConfig::global().gemini_api_key.clone()
}

pub fn gemini_model() -> String {
    AppConfig::global().gemini_model.clone()
}

pub fn grading_timeout_secs() -> u64 {
    AppConfig::global().grading_timeout_secs
}

pub fn default_concurrency() -> usize {
    AppConfig::global().default_concurrency
}

pub fn max_archive_depth() -> u32 {
    AppConfig::global().max_archive_depth
}

pub fn max_archive_unpacked_bytes() -> u64 {
    AppConfig::global().max_archive_unpacked_bytes
}
