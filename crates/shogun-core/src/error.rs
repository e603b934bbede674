//! Error types for `Shogun` core library.

use thiserror::Error;

/// Result type alias using `Shogun` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Shogun` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Role name could not be parsed
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
