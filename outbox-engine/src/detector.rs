//! Per-item conflict detection.
//!
//! Compares a pending mutation against the server's current state through
//! the `RemoteApi` fetch contract. Detection is a two-stage gate:
//!
//! 1. **Timestamp gate** — if the server has not been modified since the
//!    local edit was made, the mutation is clean.
//! 2. **Value gate** — if the server did change but every payload field
//!    already matches the remote value, the server write was unrelated to
//!    the fields the client touched and the mutation is still clean.
//!
//! Only mutations that fail both gates are real conflicts. Identity and
//! audit fields never participate in the value comparison.

use crate::remote::{FetchOutcome, RemoteApi};
use crate::{EngineError, EngineResult};
use chrono::Duration;
use outbox_types::{ConflictRecord, FieldDiff, Mutation, MutationKind, RemoteSnapshot};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Fields excluded from the value gate and from field diffs: they change on
/// every server write without representing a user-visible edit.
pub const AUDIT_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];

/// The result of checking one mutation against server state.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// No material divergence; the mutation can be applied.
    Clean,
    /// The server diverged. `None` means the entity was deleted remotely.
    Conflict(Option<RemoteSnapshot>),
}

/// Checks pending mutations for divergence from the authoritative server.
pub struct ConflictDetector {
    remote: Arc<dyn RemoteApi>,
    /// Added to the mutation's origin timestamp before the gate comparison,
    /// absorbing bounded clock drift between client and server.
    skew_tolerance: Duration,
}

impl ConflictDetector {
    /// Creates a detector with no skew tolerance.
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self::with_skew_tolerance(remote, Duration::zero())
    }

    /// Creates a detector with the given clock-skew tolerance.
    pub fn with_skew_tolerance(remote: Arc<dyn RemoteApi>, skew_tolerance: Duration) -> Self {
        Self {
            remote,
            skew_tolerance,
        }
    }

    /// Detects whether applying `mutation` would overwrite a server-side
    /// change made after the local edit.
    pub async fn detect(&self, mutation: &Mutation) -> EngineResult<Detection> {
        // A create cannot conflict: the entity does not exist remotely yet
        // from this client's perspective.
        if mutation.kind == MutationKind::Create {
            return Ok(Detection::Clean);
        }

        let snapshot = match self.remote.fetch_state(&mutation.target).await? {
            FetchOutcome::Found(snapshot) => snapshot,
            FetchOutcome::NotFound => {
                return match mutation.kind {
                    // Deleting something already gone is the desired end
                    // state; let the apply settle it.
                    MutationKind::Delete => Ok(Detection::Clean),
                    // An update against a remotely deleted entity is a
                    // conflict with no remote snapshot, never a silent drop.
                    _ => Ok(Detection::Conflict(None)),
                };
            }
            FetchOutcome::ServerError(message) => {
                return Err(EngineError::Transport(message));
            }
        };

        // Timestamp gate: server unchanged since the local edit.
        if snapshot.updated_at <= mutation.queued_at + self.skew_tolerance {
            return Ok(Detection::Clean);
        }

        // A delete carries no fields, so the value gate cannot apply: any
        // later server write conflicts with removing the entity.
        if mutation.kind == MutationKind::Delete {
            debug!(id = %mutation.id, "delete conflicts with newer server write");
            return Ok(Detection::Conflict(Some(snapshot)));
        }

        // Value gate: the server write may not have touched our fields.
        let diffs = field_diffs(mutation, &snapshot);
        if diffs.is_empty() {
            return Ok(Detection::Clean);
        }

        debug!(id = %mutation.id, fields = diffs.len(), "conflict detected");
        Ok(Detection::Conflict(Some(snapshot)))
    }
}

/// Computes the per-field divergence between a mutation's payload and a
/// remote snapshot, in payload order, skipping audit fields.
pub fn field_diffs(mutation: &Mutation, snapshot: &RemoteSnapshot) -> Vec<FieldDiff> {
    mutation
        .payload
        .iter()
        .filter(|(field, _)| !AUDIT_FIELDS.contains(&field.as_str()))
        .filter_map(|(field, local)| {
            let remote = snapshot.fields.get(field).cloned().unwrap_or(Value::Null);
            if *local == remote {
                return None;
            }
            Some(FieldDiff {
                field: field.clone(),
                local: local.clone(),
                remote,
                local_modified_at: mutation.queued_at,
                remote_modified_at: Some(snapshot.updated_at),
            })
        })
        .collect()
}

/// Projects a conflicted mutation into its presentation record.
///
/// When the stored snapshot is absent the entity was deleted remotely: every
/// payload field diffs against `Null` and the record is flagged accordingly.
pub fn conflict_record(mutation: &Mutation) -> ConflictRecord {
    match &mutation.remote_snapshot {
        Some(snapshot) => ConflictRecord::new(
            mutation.id,
            mutation.target.clone(),
            field_diffs(mutation, snapshot),
        ),
        None => {
            let diffs = mutation
                .payload
                .iter()
                .filter(|(field, _)| !AUDIT_FIELDS.contains(&field.as_str()))
                .map(|(field, local)| FieldDiff {
                    field: field.clone(),
                    local: local.clone(),
                    remote: Value::Null,
                    local_modified_at: mutation.queued_at,
                    remote_modified_at: None,
                })
                .collect();
            ConflictRecord::new(mutation.id, mutation.target.clone(), diffs)
                .with_remote_deleted()
        }
    }
}
