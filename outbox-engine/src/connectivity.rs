//! Connectivity monitoring.
//!
//! A pure signal source: the host platform reports online/offline
//! transitions through `set_online`, and the dispatcher both subscribes to
//! transitions (immediate wake on reconnect) and polls current state on its
//! safety-net interval. The monitor never retries or queues anything itself.

use tokio::sync::watch;
use tracing::debug;

/// Tracks connectivity and broadcasts transitions to subscribers.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Reports a connectivity change from the host platform.
    /// Redundant reports (same state) are not broadcast.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!(online, "connectivity changed");
        }
    }

    /// Current connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribes to connectivity transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
