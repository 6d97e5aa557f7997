//! External collaborator contracts.
//!
//! The engine never speaks a wire protocol itself. It applies mutations and
//! fetches authoritative state through `RemoteApi`, and defers manual
//! conflict decisions to an optional `ConflictHandler`. Hosts implement
//! these against their real transport; tests implement them with fakes.

use crate::EngineResult;
use async_trait::async_trait;
use outbox_types::{ConflictRecord, EntityTarget, Mutation, MutationId, RemoteSnapshot,
    ResolutionStrategy};
use std::collections::HashMap;

/// Outcome of applying a mutation to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The write was accepted.
    Applied,
    /// The target entity does not exist on the server.
    NotFound,
    /// The server rejected or failed the write.
    ServerError(String),
}

/// Outcome of fetching an entity's current server state.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The entity exists; its fields and last-modified timestamp.
    Found(RemoteSnapshot),
    /// The entity does not exist on the server.
    NotFound,
    /// The server failed the read.
    ServerError(String),
}

/// The authoritative server, as the engine sees it.
///
/// `apply` must be idempotent: after a crash mid-drain a mutation may be
/// redelivered, and re-applying an already-applied write must not corrupt
/// state or fail in a way that blocks the queue. This obligation sits with
/// the implementor; the engine guarantees at-least-once delivery only.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Applies a pending mutation. `Err` means the call itself failed
    /// (transport); the outcome distinguishes server-side results.
    async fn apply(&self, mutation: &Mutation) -> EngineResult<ApplyOutcome>;

    /// Fetches the server's current state for an entity.
    async fn fetch_state(&self, target: &EntityTarget) -> EngineResult<FetchOutcome>;
}

/// Externally supplied resolution decisions for manual conflict handling.
///
/// Invoked at most once per drain cycle with every currently unresolved
/// conflict. The returned map chooses a strategy per mutation id; ids left
/// out (or mapped to `Manual`) stay conflicted until the next cycle. The
/// callback may await human input for an unbounded time.
#[async_trait]
pub trait ConflictHandler: Send + Sync {
    async fn resolve_conflicts(
        &self,
        conflicts: Vec<ConflictRecord>,
    ) -> EngineResult<HashMap<MutationId, ResolutionStrategy>>;
}
