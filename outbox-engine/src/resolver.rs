//! Resolution-strategy executor.
//!
//! Turns a conflicted mutation plus a chosen strategy into its outcome:
//! either a rewritten mutation that re-enters the queue as `Pending`, a
//! settle (the server value stands), or a deferral back to `Conflicted`.
//! The executor is pure; the dispatcher owns persistence and events.

use chrono::Utc;
use outbox_types::{Mutation, RemoteSnapshot, ResolutionStrategy};
use tracing::debug;

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The rewritten mutation re-enters `Pending` for re-apply.
    Reapply(Mutation),
    /// The local write is discarded; the queue entry settles with no
    /// further network call.
    Settle,
    /// No decision; the mutation stays `Conflicted` until the next cycle.
    Defer,
}

/// Applies a resolution strategy to a conflicted mutation.
///
/// `snapshot` is the server's view captured at detection time; `None` means
/// the entity was deleted remotely, in which case `Merge` degenerates to
/// `KeepLocal` (there is nothing to overlay onto).
pub fn resolve(
    mutation: &Mutation,
    snapshot: Option<&RemoteSnapshot>,
    strategy: ResolutionStrategy,
) -> Resolution {
    match strategy {
        ResolutionStrategy::KeepLocal => Resolution::Reapply(reset_for_reapply(mutation.clone())),
        ResolutionStrategy::KeepServer => {
            debug!(id = %mutation.id, "keep-server: discarding local write");
            Resolution::Settle
        }
        ResolutionStrategy::Merge => {
            let mut resolved = mutation.clone();
            if let Some(snapshot) = snapshot {
                // Start from the remote state, then overlay every field the
                // local payload explicitly set. Fields the client never
                // touched keep their server values.
                let mut merged = snapshot.fields.clone();
                for (field, value) in &resolved.payload {
                    merged.insert(field.clone(), value.clone());
                }
                resolved.payload = merged;
            }
            Resolution::Reapply(reset_for_reapply(resolved))
        }
        ResolutionStrategy::Manual => Resolution::Defer,
    }
}

/// Refreshes the origin timestamp (the resolution is a new local decision)
/// and returns the mutation to `Pending` with a fresh attempt budget.
fn reset_for_reapply(mut mutation: Mutation) -> Mutation {
    mutation.queued_at = Utc::now();
    mutation.reset_attempts();
    mutation.reset_pending();
    mutation
}
