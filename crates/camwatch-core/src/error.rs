//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

use camwatch_media::MediaError;
use camwatch_models::SettingsValidationError;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cannot create recordings directory {path}: {source}")]
    RecordingsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid recording name: {0}")]
    InvalidName(String),

    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("Recording controller is not running")]
    ControllerGone,

    #[error("Invalid settings: {0}")]
    Validation(#[from] SettingsValidationError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Errors that should end the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::RecordingsDir { .. } | CoreError::ConfigError(_))
    }
}
