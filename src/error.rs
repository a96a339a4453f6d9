//! Error types for pressure-headache

use thiserror::Error;

/// Errors that can occur while analyzing forecasts or touching the log
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Export error: {0}")]
    ExportError(String),
}

impl From<std::io::Error> for TrackerError {
    fn from(e: std::io::Error) -> Self {
        TrackerError::StorageError(e.to_string())
    }
}

impl From<csv::Error> for TrackerError {
    fn from(e: csv::Error) -> Self {
        TrackerError::ExportError(e.to_string())
    }
}

#[cfg(feature = "net")]
impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        TrackerError::UpstreamError(e.to_string())
    }
}
