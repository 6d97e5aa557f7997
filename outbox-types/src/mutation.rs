//! Queued mutation types.
//!
//! A `Mutation` is a single pending write captured while the client was
//! offline (or optimistically queued regardless of connectivity). It carries
//! everything needed to replay the write against the server later: the kind
//! of operation, the target entity, the field-level payload, and the retry
//! and conflict bookkeeping the dispatcher maintains.
//!
//! The engine has no knowledge of what the payload fields mean. That is
//! entirely host-defined.

use crate::MutationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Field-level data of a mutation: field name → JSON value.
pub type Payload = serde_json::Map<String, Value>;

/// The kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// Stable string form used for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(crate::Error::UnknownVariant {
                kind: "mutation kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a queued mutation.
///
/// A mutation is in exactly one status at any time. `Failed` and `Conflicted`
/// are terminal until an explicit action (retry command, resolution) moves
/// the mutation back to `Pending` or out of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationStatus {
    /// Waiting to be drained.
    Pending,
    /// Currently being applied to the server.
    InFlight,
    /// Exhausted its retry budget; excluded from automatic drains.
    Failed,
    /// The server diverged from what this mutation assumes.
    Conflicted,
    /// Applied successfully or explicitly superseded by server state.
    Settled,
}

impl MutationStatus {
    /// Stable string form used for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in-flight",
            Self::Failed => "failed",
            Self::Conflicted => "conflicted",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-flight" => Ok(Self::InFlight),
            "failed" => Ok(Self::Failed),
            "conflicted" => Ok(Self::Conflicted),
            "settled" => Ok(Self::Settled),
            other => Err(crate::Error::UnknownVariant {
                kind: "mutation status",
                value: other.to_string(),
            }),
        }
    }
}

/// The entity a mutation targets: a host-defined type tag plus the entity's
/// id. The id is absent for creates until the server assigns one; the engine
/// passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTarget {
    /// Host-defined entity type (e.g. "order", "customer").
    pub entity_type: String,
    /// Server-side entity id, if known.
    pub entity_id: Option<String>,
}

impl EntityTarget {
    /// Creates a target for an existing entity.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Creates a target for an entity that does not exist remotely yet.
    pub fn unassigned(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: None,
        }
    }
}

impl fmt::Display for EntityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(id) => write!(f, "{}/{}", self.entity_type, id),
            None => write!(f, "{}/?", self.entity_type),
        }
    }
}

/// The server's view of an entity at the time it was fetched, plus the
/// server-reported last-modified timestamp used by the conflict gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Field name → value as the server currently stores them.
    pub fields: Payload,
    /// When the server last modified the entity.
    pub updated_at: DateTime<Utc>,
}

impl RemoteSnapshot {
    /// Creates a snapshot from fields and a last-modified timestamp.
    #[must_use]
    pub fn new(fields: Payload, updated_at: DateTime<Utc>) -> Self {
        Self { fields, updated_at }
    }
}

/// A single pending write awaiting application to the authoritative server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Unique, time-ordered identifier assigned at enqueue.
    pub id: MutationId,

    /// The kind of write.
    pub kind: MutationKind,

    /// The entity this write targets.
    pub target: EntityTarget,

    /// Field-level data to write. Empty for deletes.
    #[serde(default)]
    pub payload: Payload,

    /// Wall-clock time of the local edit; compared against the server's
    /// last-modified timestamp during conflict detection.
    pub queued_at: DateTime<Utc>,

    /// Number of apply attempts made so far.
    pub attempts: u32,

    /// Attempts allowed before the mutation becomes terminally `Failed`.
    pub max_attempts: u32,

    /// Current lifecycle status.
    pub status: MutationStatus,

    /// Failure detail; present only while status is `Failed`.
    #[serde(default)]
    pub last_error: Option<String>,

    /// The server's view at conflict-detection time; present only while
    /// status is `Conflicted`.
    #[serde(default)]
    pub remote_snapshot: Option<RemoteSnapshot>,
}

impl Mutation {
    /// Default retry budget.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Creates a new pending mutation.
    #[must_use]
    pub fn new(kind: MutationKind, target: EntityTarget, payload: Payload) -> Self {
        Self {
            id: MutationId::new(),
            kind,
            target,
            payload,
            queued_at: Utc::now(),
            attempts: 0,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            status: MutationStatus::Pending,
            last_error: None,
            remote_snapshot: None,
        }
    }

    /// Creates a pending create.
    #[must_use]
    pub fn create(target: EntityTarget, payload: Payload) -> Self {
        Self::new(MutationKind::Create, target, payload)
    }

    /// Creates a pending update.
    #[must_use]
    pub fn update(target: EntityTarget, payload: Payload) -> Self {
        Self::new(MutationKind::Update, target, payload)
    }

    /// Creates a pending delete.
    #[must_use]
    pub fn delete(target: EntityTarget) -> Self {
        Self::new(MutationKind::Delete, target, Payload::new())
    }

    /// Overrides the retry budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// True once the retry budget is exhausted.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    // ── Status transitions ───────────────────────────────────────
    //
    // Invariant: entering `Conflicted` stores the remote snapshot; leaving
    // it clears the snapshot. `last_error` is only populated while `Failed`.

    /// Marks the mutation as being applied. The attempt is only counted
    /// when it fails; a successful apply settles the mutation. Any error
    /// from a previous attempt is cleared along with the `Failed` status.
    pub fn begin_attempt(&mut self) {
        self.status = MutationStatus::InFlight;
        self.last_error = None;
    }

    /// Marks the mutation as settled, clearing transient state.
    pub fn settle(&mut self) {
        self.status = MutationStatus::Settled;
        self.last_error = None;
        self.remote_snapshot = None;
    }

    /// Records a failed attempt, incrementing the attempt count. The status
    /// becomes `Failed` either way; whether the mutation is still eligible
    /// for automatic retry is decided by the queue from `retries_exhausted`.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = MutationStatus::Failed;
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.remote_snapshot = None;
    }

    /// Parks the mutation as conflicted with the server's current view.
    /// `snapshot` is `None` when the entity was deleted remotely.
    pub fn park_conflicted(&mut self, snapshot: Option<RemoteSnapshot>) {
        self.status = MutationStatus::Conflicted;
        self.remote_snapshot = snapshot;
        self.last_error = None;
    }

    /// Returns the mutation to `Pending`, clearing conflict and error state.
    /// Used for explicit retries and for resolutions that re-apply.
    pub fn reset_pending(&mut self) {
        self.status = MutationStatus::Pending;
        self.last_error = None;
        self.remote_snapshot = None;
    }

    /// Resets the attempt counter (explicit retry command).
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }
}
