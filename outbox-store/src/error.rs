//! Error types for the storage layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying store cannot be used (open failure, quota, corruption).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Mutation not found.
    #[error("mutation not found: {0}")]
    NotFound(String),

    /// A persisted row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// True when the error means the store as a whole is unusable and the
    /// engine should degrade to memory-only operation for the session.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Database(_))
    }
}
