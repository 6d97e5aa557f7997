//! The durable mutation queue.
//!
//! Wraps the injected store with the queue's bookkeeping rules: status
//! transitions, retry accounting, and the degrade-to-memory fallback. All
//! queue state flows through the store's atomic per-record operations, so
//! the in-memory view is always reconstructable after a crash.
//!
//! Ordering: `list_all` returns enqueue order (mutation ids are UUID v7),
//! which gives per-entity FIFO when the dispatcher processes a batch
//! sequentially. No global total order across entities is promised.

use crate::{EngineError, EngineResult};
use outbox_store::{MemoryStore, MutationStore, StoreResult};
use outbox_types::{
    EntityTarget, Mutation, MutationId, MutationKind, MutationStatus, Payload, RemoteSnapshot,
    SyncStatus,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// FIFO-ish ordered record of pending writes with retry bookkeeping.
pub struct MutationQueue {
    store: Arc<dyn MutationStore>,
    fallback: MemoryStore,
    degraded: AtomicBool,
    default_max_attempts: u32,
}

impl MutationQueue {
    /// Creates a queue over the given store.
    pub fn new(store: Arc<dyn MutationStore>, default_max_attempts: u32) -> Self {
        Self {
            store,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
            default_max_attempts,
        }
    }

    /// True once the durable store failed and the queue fell back to
    /// memory-only operation for this session.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Runs a store operation, degrading to the in-memory fallback if the
    /// durable store reports unavailability. Mutations captured before the
    /// degradation stay in the durable store and are picked up again on the
    /// next session; anything written afterwards lives only in memory.
    fn with_store<T>(&self, op: impl Fn(&dyn MutationStore) -> StoreResult<T>) -> EngineResult<T> {
        if !self.is_degraded() {
            match op(self.store.as_ref()) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_unavailable() => {
                    warn!(error = %err, "durable store unavailable, degrading to memory-only");
                    self.degraded.store(true, Ordering::SeqCst);
                }
                Err(err) => return Err(err.into()),
            }
        }
        op(&self.fallback).map_err(EngineError::from)
    }

    // ── Enqueue & inspection ─────────────────────────────────────

    /// Appends a new pending mutation and returns it.
    pub fn enqueue(
        &self,
        kind: MutationKind,
        target: EntityTarget,
        payload: Payload,
    ) -> EngineResult<Mutation> {
        let mutation =
            Mutation::new(kind, target, payload).with_max_attempts(self.default_max_attempts);
        self.with_store(|store| store.append(&mutation))?;
        debug!(id = %mutation.id, kind = %mutation.kind, target = %mutation.target, "enqueued");
        Ok(mutation)
    }

    /// Returns every queued mutation in enqueue order.
    pub fn list_all(&self) -> EngineResult<Vec<Mutation>> {
        self.with_store(|store| store.list_all())
    }

    /// Fetches one mutation, erroring if it is gone.
    fn get_required(&self, id: MutationId) -> EngineResult<Mutation> {
        self.with_store(|store| store.get(id))?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Returns the drain-eligible mutations with any of the given statuses,
    /// in enqueue order. `Failed` mutations that exhausted their retry
    /// budget are terminal and always excluded; only an explicit retry
    /// command brings them back.
    pub fn dequeue_batch(&self, statuses: &[MutationStatus]) -> EngineResult<Vec<Mutation>> {
        let all = self.list_all()?;
        Ok(all
            .into_iter()
            .filter(|m| statuses.contains(&m.status))
            .filter(|m| m.status != MutationStatus::Failed || !m.retries_exhausted())
            .collect())
    }

    /// Counts mutations per status bucket: (pending, failed, conflicted).
    pub fn counts(&self) -> EngineResult<(usize, usize, usize)> {
        let all = self.list_all()?;
        let pending = all
            .iter()
            .filter(|m| matches!(m.status, MutationStatus::Pending | MutationStatus::InFlight))
            .count();
        let failed = all.iter().filter(|m| m.status == MutationStatus::Failed).count();
        let conflicted = all
            .iter()
            .filter(|m| m.status == MutationStatus::Conflicted)
            .count();
        Ok((pending, failed, conflicted))
    }

    // ── Status transitions ───────────────────────────────────────

    /// Marks a mutation in-flight and returns the updated record.
    pub fn mark_in_flight(&self, id: MutationId) -> EngineResult<Mutation> {
        let mut mutation = self.get_required(id)?;
        mutation.begin_attempt();
        self.with_store(|store| store.update(&mutation))?;
        Ok(mutation)
    }

    /// Settles a mutation: confirmed applied (or explicitly superseded by
    /// server state), so its record is removed from the queue.
    pub fn mark_settled(&self, id: MutationId) -> EngineResult<()> {
        self.with_store(|store| store.remove(id))?;
        debug!(%id, "settled");
        Ok(())
    }

    /// Records a failed attempt and returns the updated record. The
    /// mutation stays drain-eligible until its retry budget runs out.
    pub fn mark_failed(&self, id: MutationId, error: &str) -> EngineResult<Mutation> {
        let mut mutation = self.get_required(id)?;
        mutation.fail(error);
        self.with_store(|store| store.update(&mutation))?;
        if mutation.retries_exhausted() {
            warn!(%id, attempts = mutation.attempts, "retries exhausted, mutation is terminal");
        }
        Ok(mutation)
    }

    /// Parks a mutation as conflicted with the server's view at detection
    /// time (`None` when the entity was deleted remotely).
    pub fn mark_conflicted(
        &self,
        id: MutationId,
        snapshot: Option<RemoteSnapshot>,
    ) -> EngineResult<Mutation> {
        let mut mutation = self.get_required(id)?;
        mutation.park_conflicted(snapshot);
        self.with_store(|store| store.update(&mutation))?;
        debug!(%id, "conflicted");
        Ok(mutation)
    }

    /// Replaces a conflicted mutation with its resolved rewrite, already
    /// reset to `Pending` by the resolver.
    pub fn put_resolved(&self, mutation: &Mutation) -> EngineResult<()> {
        self.with_store(|store| store.update(mutation))?;
        Ok(())
    }

    // ── Recovery & administrative operations ─────────────────────

    /// Demotes mutations stuck `InFlight` by a crash mid-drain back to
    /// `Pending`. The apply contract is idempotent under redelivery, so
    /// this is safe. Returns how many were recovered.
    pub fn recover(&self) -> EngineResult<usize> {
        let mut recovered = 0;
        for mut mutation in self.list_all()? {
            if mutation.status == MutationStatus::InFlight {
                mutation.reset_pending();
                self.with_store(|store| store.update(&mutation))?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            debug!(recovered, "recovered in-flight mutations to pending");
        }
        Ok(recovered)
    }

    /// Resets every terminal `Failed` mutation to `Pending` with a fresh
    /// attempt budget. Returns how many were reset.
    pub fn retry_failed(&self) -> EngineResult<usize> {
        let mut reset = 0;
        for mut mutation in self.list_all()? {
            if mutation.status == MutationStatus::Failed {
                mutation.reset_attempts();
                mutation.reset_pending();
                self.with_store(|store| store.update(&mutation))?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Discards every `Failed` mutation. Returns how many were removed.
    pub fn clear_failed(&self) -> EngineResult<usize> {
        self.clear_with_status(MutationStatus::Failed)
    }

    /// Discards every `Conflicted` mutation (the server value stands).
    /// Returns how many were removed.
    pub fn clear_conflicts(&self) -> EngineResult<usize> {
        self.clear_with_status(MutationStatus::Conflicted)
    }

    fn clear_with_status(&self, status: MutationStatus) -> EngineResult<usize> {
        let mut removed = 0;
        for mutation in self.list_all()? {
            if mutation.status == status {
                self.with_store(|store| store.remove(mutation.id))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Discards every queued mutation.
    pub fn clear_all(&self) -> EngineResult<()> {
        self.with_store(|store| store.clear())
    }

    // ── Status snapshot persistence ──────────────────────────────

    /// Persists the derived sync-status snapshot.
    pub fn write_status(&self, status: &SyncStatus) -> EngineResult<()> {
        self.with_store(|store| store.write_status(status))
    }

    /// Reads the last persisted sync-status snapshot.
    pub fn read_status(&self) -> EngineResult<Option<SyncStatus>> {
        self.with_store(|store| store.read_status())
    }
}
