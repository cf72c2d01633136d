//! Configuration error types

use thiserror::Error;

/// Configuration result type
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration key not found: {key}")]
    NotFound { key: String },

    #[error("Version not found: {version_id} for key {key}")]
    VersionNotFound { version_id: String, key: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("{operation}: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Wrap an error with the manager-level operation that failed
    pub fn operation(operation: impl Into<String>, source: ConfigError) -> Self {
        ConfigError::Operation {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}
