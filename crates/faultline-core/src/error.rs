//! Error types and result handling for core storage operations.
//!
//! Capture-path code never surfaces these to the host application; they are
//! logged and degraded. Only `load`, `export`, and `import` propagate them
//! to callers that asked for durability explicitly.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage and validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing key-value store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A persisted blob could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A single record exceeds the configured serialized-size cap.
    #[error("payload too large: {size_bytes} bytes exceeds {max_bytes} byte limit")]
    PayloadTooLarge {
        /// Serialized size of the offending record.
        size_bytes: usize,
        /// Configured per-record cap.
        max_bytes: usize,
    },
}

impl CoreError {
    /// Creates a persistence error from a backend message.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
