//! # Application Error Type
//!
//! Errors surfaced by `run()` and the config loader.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Vitrine                                │
//! │                                                                         │
//! │  AppConfig::load ──► io / toml errors ───────────────┐                  │
//! │                                                       │                  │
//! │  bootstrap ────────► StoreError (registration) ──────┼──► AppError      │
//! │                                                       │                  │
//! │  demo ─────────────► StoreError (commit / action) ───┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use vitrine_store::StoreError;

/// Result type alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Engine failure (registration, commit, action, getter).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or writing the config file failed.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for `AppConfig`.
    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// A config value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No explicit path was given and the platform has no config directory.
    #[error("No config path available")]
    NoConfigPath,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// True for problems with the configuration rather than the store.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::ConfigParse(_)
                | AppError::ConfigWrite(_)
                | AppError::InvalidConfig(_)
                | AppError::NoConfigPath
        ) || matches!(self, AppError::Store(StoreError::InvalidConfig(_)))
    }
}
