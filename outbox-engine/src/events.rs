//! Engine event stream.
//!
//! External consumers (typically the host UI) learn queue state through
//! these events; the engine exposes no polling surface beyond `list_all`
//! and `status` for initial render. Subscriptions are held in an explicit
//! registry with an unsubscribe handle so lifecycle and teardown stay
//! deterministic; there are no ambient global listeners.

use outbox_types::{ConflictRecord, Mutation, SyncStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Summary of one completed drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Mutations applied and removed from the queue.
    pub settled: usize,
    /// Mutations that recorded a failed attempt.
    pub failed: usize,
    /// Mutations parked as conflicted.
    pub conflicted: usize,
}

/// An event emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The derived sync status changed.
    StatusChanged(SyncStatus),
    /// A mutation was applied (or superseded) and left the queue.
    ItemSettled(Mutation),
    /// A mutation recorded a failed attempt.
    ItemFailed(Mutation),
    /// One drain cycle found these unresolved conflicts.
    ConflictsDetected(Vec<ConflictRecord>),
    /// A drain cycle finished.
    DrainComplete(DrainReport),
}

type Registry = Arc<Mutex<Vec<(u64, mpsc::UnboundedSender<EngineEvent>)>>>;

/// Fan-out of engine events to subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Registry,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Dropping the receiver also ends delivery;
    /// the handle allows explicit removal.
    pub fn subscribe(&self) -> (Subscription, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().push((id, tx));
        (
            Subscription {
                id,
                registry: Arc::clone(&self.subscribers),
            },
            rx,
        )
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Delivers an event to every subscriber, pruning closed receivers.
    pub fn emit(&self, event: &EngineEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

/// Handle for removing a subscription from the bus.
pub struct Subscription {
    id: u64,
    registry: Registry,
}

impl Subscription {
    /// Removes this subscription; its receiver stops getting events.
    pub fn unsubscribe(self) {
        self.registry.lock().unwrap().retain(|(id, _)| *id != self.id);
    }
}
