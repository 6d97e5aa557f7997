//! Shared test doubles for engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outbox_engine::{ApplyOutcome, ConflictHandler, EngineError, EngineResult, FetchOutcome, RemoteApi};
use outbox_types::{
    ConflictRecord, EntityTarget, Mutation, MutationId, MutationKind, Payload, RemoteSnapshot,
    ResolutionStrategy,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn payload(fields: serde_json::Value) -> Payload {
    fields.as_object().cloned().expect("object payload")
}

/// In-memory authoritative server. Applies are idempotent: re-applying the
/// same mutation leaves entity state unchanged.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<HashMap<String, RemoteSnapshot>>,
    apply_calls: Mutex<Vec<Mutation>>,
    /// Entity ids whose applies fail at the transport level.
    failing: Mutex<HashSet<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the server's state for an entity.
    pub fn put_entity(&self, entity_id: &str, fields: serde_json::Value, updated_at: DateTime<Utc>) {
        self.state.lock().unwrap().insert(
            entity_id.to_string(),
            RemoteSnapshot::new(payload(fields), updated_at),
        );
    }

    /// Makes every apply for the given entity fail with a transport error.
    pub fn fail_applies_for(&self, entity_id: &str) {
        self.failing.lock().unwrap().insert(entity_id.to_string());
    }

    /// Restores normal applies for the given entity.
    pub fn restore(&self, entity_id: &str) {
        self.failing.lock().unwrap().remove(entity_id);
    }

    pub fn entity(&self, entity_id: &str) -> Option<RemoteSnapshot> {
        self.state.lock().unwrap().get(entity_id).cloned()
    }

    pub fn apply_calls(&self) -> Vec<Mutation> {
        self.apply_calls.lock().unwrap().clone()
    }

    pub fn apply_count_for(&self, entity_id: &str) -> usize {
        self.apply_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.target.entity_id.as_deref() == Some(entity_id))
            .count()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn apply(&self, mutation: &Mutation) -> EngineResult<ApplyOutcome> {
        let key = mutation
            .target
            .entity_id
            .clone()
            .unwrap_or_else(|| mutation.id.to_string());

        if self.failing.lock().unwrap().contains(&key) {
            return Err(EngineError::Transport("connection refused".to_string()));
        }

        self.apply_calls.lock().unwrap().push(mutation.clone());

        let mut state = self.state.lock().unwrap();
        match mutation.kind {
            MutationKind::Create => {
                state.insert(
                    key,
                    RemoteSnapshot::new(mutation.payload.clone(), mutation.queued_at),
                );
                Ok(ApplyOutcome::Applied)
            }
            MutationKind::Update => match state.get_mut(&key) {
                Some(snapshot) => {
                    for (field, value) in &mutation.payload {
                        snapshot.fields.insert(field.clone(), value.clone());
                    }
                    snapshot.updated_at = mutation.queued_at;
                    Ok(ApplyOutcome::Applied)
                }
                None => Ok(ApplyOutcome::NotFound),
            },
            MutationKind::Delete => {
                if state.remove(&key).is_some() {
                    Ok(ApplyOutcome::Applied)
                } else {
                    Ok(ApplyOutcome::NotFound)
                }
            }
        }
    }

    async fn fetch_state(&self, target: &EntityTarget) -> EngineResult<FetchOutcome> {
        let Some(entity_id) = &target.entity_id else {
            return Ok(FetchOutcome::NotFound);
        };
        match self.state.lock().unwrap().get(entity_id) {
            Some(snapshot) => Ok(FetchOutcome::Found(snapshot.clone())),
            None => Ok(FetchOutcome::NotFound),
        }
    }
}

/// Conflict handler scripted with fixed strategy choices.
pub struct ScriptedHandler {
    choices: Mutex<HashMap<MutationId, ResolutionStrategy>>,
    fail: bool,
    pub seen: Mutex<Vec<Vec<ConflictRecord>>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self {
            choices: Mutex::new(HashMap::new()),
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            choices: Mutex::new(HashMap::new()),
            fail: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn choose(&self, id: MutationId, strategy: ResolutionStrategy) {
        self.choices.lock().unwrap().insert(id, strategy);
    }

    pub fn invocations(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ConflictHandler for ScriptedHandler {
    async fn resolve_conflicts(
        &self,
        conflicts: Vec<ConflictRecord>,
    ) -> EngineResult<HashMap<MutationId, ResolutionStrategy>> {
        self.seen.lock().unwrap().push(conflicts);
        if self.fail {
            return Err(EngineError::Callback("decision UI crashed".to_string()));
        }
        Ok(self.choices.lock().unwrap().clone())
    }
}
