//! Settings errors.

use thiserror::Error;

/// Why the bridge settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read drawbridge settings: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON or has the wrong shape.
    #[error("malformed drawbridge settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A merged value is outside what the bridge can run with.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Settings result alias.
pub type Result<T> = std::result::Result<T, SettingsError>;
