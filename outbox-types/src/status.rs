//! Queue-wide sync status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived, process-wide view of the queue, recomputed after every queue
/// change. Has no identity beyond "current snapshot"; the host UI renders
/// it directly (pending/failed/conflicted badges, degraded banner).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Current connectivity as last reported by the monitor.
    pub online: bool,
    /// True while a drain cycle is running.
    pub syncing: bool,
    /// True when durable persistence failed and the engine fell back to
    /// memory-only operation for this session.
    pub degraded: bool,
    /// Mutations waiting to be drained.
    pub pending: usize,
    /// Mutations that exhausted their retry budget.
    pub failed: usize,
    /// Mutations parked on a conflict.
    pub conflicted: usize,
    /// When the last drain cycle settled at least one mutation.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Most recent error summary, if any.
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// True when nothing is queued in any bucket.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.failed == 0 && self.conflicted == 0 && !self.syncing
    }
}
