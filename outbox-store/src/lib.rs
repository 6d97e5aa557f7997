//! Durable storage for the outbox mutation queue.
//!
//! Persists queued mutations and the derived sync-status snapshot across
//! process restarts. SQLite is the production backend; an in-memory store
//! backs tests and the degraded mode the engine falls into when durable
//! persistence fails mid-session.
//!
//! # Architecture
//!
//! - One row per mutation, atomic per-record operations
//! - Payloads and snapshots stored as JSON text columns
//! - `list_all` returns rows in enqueue order (mutation ids are UUID v7)
//! - The sync-status snapshot lives in a single-row table; it is derived
//!   state, reconstructable from the mutations themselves

mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use outbox_types::{Mutation, MutationId, SyncStatus};

/// Durable persistence contract for the mutation queue.
///
/// All operations are atomic with respect to a single mutation record and
/// must survive process restart (the in-memory implementation excepted).
/// Implementations are called from async context but are synchronous; they
/// must not block beyond a local database call.
pub trait MutationStore: Send + Sync {
    /// Appends a new mutation record.
    fn append(&self, mutation: &Mutation) -> StoreResult<()>;

    /// Rewrites an existing mutation record in full.
    fn update(&self, mutation: &Mutation) -> StoreResult<()>;

    /// Removes a mutation record. Removing an absent id is not an error.
    fn remove(&self, id: MutationId) -> StoreResult<()>;

    /// Fetches a single mutation.
    fn get(&self, id: MutationId) -> StoreResult<Option<Mutation>>;

    /// Returns every stored mutation in enqueue order.
    fn list_all(&self) -> StoreResult<Vec<Mutation>>;

    /// Removes every mutation record.
    fn clear(&self) -> StoreResult<()>;

    /// Reads the persisted sync-status snapshot, if one was written.
    fn read_status(&self) -> StoreResult<Option<SyncStatus>>;

    /// Persists the sync-status snapshot.
    fn write_status(&self, status: &SyncStatus) -> StoreResult<()>;
}
