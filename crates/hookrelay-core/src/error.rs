//! Error types for request model operations.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for request encoding and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Request could not be encoded to or decoded from its wire form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request fields violate an invariant.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CoreError {
    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
