/*!
Error types for the Keepsake core engine.
*/

use thiserror::Error;

/// Result type used throughout the Keepsake core.
pub type Result<T> = std::result::Result<T, KeepsakeError>;

/// Errors that can occur during snapshot operations.
#[derive(Error, Debug)]
pub enum KeepsakeError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Invalid snapshot format
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Visitor failures while reading or writing a service's state
    #[error("Visitor error for service '{service}': {message}")]
    Visitor { service: String, message: String },
}

impl KeepsakeError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new visitor error for the named service
    pub fn visitor<S1: Into<String>, S2: Into<String>>(service: S1, message: S2) -> Self {
        Self::Visitor {
            service: service.into(),
            message: message.into(),
        }
    }
}
