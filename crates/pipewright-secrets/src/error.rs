//! Secret store error types

use thiserror::Error;

/// Secret operation result type
pub type Result<T> = std::result::Result<T, SecretError>;

/// Secret store errors
///
/// Expiration and integrity failures are distinct from plain not-found so
/// operators can tell corruption from absence.
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Secret not found: {key}")]
    NotFound { key: String },

    #[error("Secret has expired: {key}")]
    Expired { key: String },

    #[error("Secret integrity check failed: {key}")]
    Integrity { key: String },

    #[error("Encryption error: {message}")]
    Encryption { message: String },

    #[error("Decryption error: {message}")]
    Decryption { message: String },

    #[error("Key derivation error: {message}")]
    KeyDerivation { message: String },

    #[error("{backend} configuration not provided: {message}")]
    MissingConfiguration { backend: String, message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
