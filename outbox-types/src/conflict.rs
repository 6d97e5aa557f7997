//! Conflict projections and resolution strategies.
//!
//! A `ConflictRecord` is a read-projection of a conflicted mutation, shaped
//! for presentation and decision-making: one field diff per field where the
//! local payload and the server's snapshot disagree. It is never a source of
//! truth; its lifecycle mirrors the mutation's `Conflicted` status.

use crate::{EntityTarget, MutationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The rule used to decide the outcome of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Re-apply the local payload as-is; the client's edit wins.
    KeepLocal,
    /// Discard the local write; the server value stands.
    KeepServer,
    /// Overlay the local payload's fields onto the server snapshot.
    Merge,
    /// Defer to an externally supplied decision, one per conflict.
    Manual,
}

impl ResolutionStrategy {
    /// Stable string form used for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KeepLocal => "keep-local",
            Self::KeepServer => "keep-server",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-local" => Ok(Self::KeepLocal),
            "keep-server" => Ok(Self::KeepServer),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            other => Err(crate::Error::UnknownVariant {
                kind: "resolution strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// One field where the local payload and the server snapshot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Field name.
    pub field: String,
    /// The value the local mutation wants to write.
    pub local: Value,
    /// The value the server currently holds (`Null` if absent remotely).
    pub remote: Value,
    /// When the local edit was made.
    pub local_modified_at: DateTime<Utc>,
    /// When the server last modified the entity.
    pub remote_modified_at: Option<DateTime<Utc>>,
}

/// Materialized view of a conflicted mutation for presentation and decision.
///
/// Shares its id with the originating mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Id of the conflicted mutation.
    pub id: MutationId,
    /// The entity in dispute.
    pub target: EntityTarget,
    /// Every field where local and remote values differ, in payload order.
    pub diffs: Vec<FieldDiff>,
    /// True when the entity no longer exists on the server.
    pub remote_deleted: bool,
    /// Set once a decision has been made.
    pub resolved: bool,
    /// The strategy chosen, once resolved.
    pub strategy: Option<ResolutionStrategy>,
}

impl ConflictRecord {
    /// Creates an unresolved record.
    #[must_use]
    pub fn new(id: MutationId, target: EntityTarget, diffs: Vec<FieldDiff>) -> Self {
        Self {
            id,
            target,
            diffs,
            remote_deleted: false,
            resolved: false,
            strategy: None,
        }
    }

    /// Marks the record with the entity having been deleted remotely.
    #[must_use]
    pub fn with_remote_deleted(mut self) -> Self {
        self.remote_deleted = true;
        self
    }

    /// Records the chosen strategy.
    pub fn resolve(&mut self, strategy: ResolutionStrategy) {
        self.resolved = true;
        self.strategy = Some(strategy);
    }
}
