//! Notification error types

use thiserror::Error;

/// Notification result type
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Channel not found: {id}")]
    ChannelNotFound { id: String },

    #[error("Channel already registered: {id}")]
    DuplicateChannel { id: String },

    #[error("Delivery failed for channel {channel_id}: {message}")]
    Delivery { channel_id: String, message: String },

    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidFilter { pattern: String, message: String },

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
