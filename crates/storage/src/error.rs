//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation not supported by {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
