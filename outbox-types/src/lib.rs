//! Core type definitions for the outbox mutation queue.
//!
//! This crate defines the fundamental, entity-agnostic types used throughout
//! the engine:
//! - Mutation identifiers (UUID v7)
//! - Pending mutations and their status lifecycle
//! - Conflict projections (field diffs, resolution strategies)
//! - The derived queue-wide sync status snapshot
//!
//! Business-specific entity types (what the payload fields mean, how they are
//! validated) belong to the host application, not here. The engine only sees
//! JSON field maps.

mod conflict;
mod ids;
mod mutation;
mod status;

pub use conflict::{ConflictRecord, FieldDiff, ResolutionStrategy};
pub use ids::MutationId;
pub use mutation::{EntityTarget, Mutation, MutationKind, MutationStatus, Payload, RemoteSnapshot};
pub use status::SyncStatus;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
