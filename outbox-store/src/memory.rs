//! In-memory mutation store.
//!
//! Used by tests and as the session-scoped fallback when the durable store
//! becomes unavailable. Records are keyed by mutation id; UUID v7 ordering
//! keeps iteration in enqueue order.

use crate::{MutationStore, StoreError, StoreResult};
use outbox_types::{Mutation, MutationId, SyncStatus};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Non-durable mutation store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    mutations: BTreeMap<MutationId, Mutation>,
    status: Option<SyncStatus>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MutationStore for MemoryStore {
    fn append(&self, mutation: &Mutation) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations.insert(mutation.id, mutation.clone());
        Ok(())
    }

    fn update(&self, mutation: &Mutation) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.mutations.get_mut(&mutation.id) {
            Some(existing) => {
                *existing = mutation.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(mutation.id.to_string())),
        }
    }

    fn remove(&self, id: MutationId) -> StoreResult<()> {
        self.inner.lock().unwrap().mutations.remove(&id);
        Ok(())
    }

    fn get(&self, id: MutationId) -> StoreResult<Option<Mutation>> {
        Ok(self.inner.lock().unwrap().mutations.get(&id).cloned())
    }

    fn list_all(&self) -> StoreResult<Vec<Mutation>> {
        Ok(self.inner.lock().unwrap().mutations.values().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.inner.lock().unwrap().mutations.clear();
        Ok(())
    }

    fn read_status(&self) -> StoreResult<Option<SyncStatus>> {
        Ok(self.inner.lock().unwrap().status.clone())
    }

    fn write_status(&self, status: &SyncStatus) -> StoreResult<()> {
        self.inner.lock().unwrap().status = Some(status.clone());
        Ok(())
    }
}
