//! Error types for the engine.

use outbox_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// Per-item errors (`Transport`, `NotFound`) never abort a drain cycle;
/// only store-level errors do. `Callback` leaves the affected mutations
/// conflicted for the next cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Durable persistence failed; the engine degrades to memory-only
    /// operation for the session.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store operation failed for a reason other than availability.
    #[error("storage error: {0}")]
    Storage(String),

    /// An apply or fetch call to the server failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A mutation referenced by id is no longer in the queue.
    #[error("mutation not found: {0}")]
    NotFound(String),

    /// The external conflict-resolution callback failed or timed out.
    #[error("conflict callback failed: {0}")]
    Callback(String),

    /// A mutation reached its retry budget.
    #[error("retries exhausted for mutation {0}")]
    RetriesExhausted(String),

    /// A drain was forced while the monitor reports offline.
    #[error("cannot drain while offline")]
    Offline,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::Storage(err.to_string())
        }
    }
}
