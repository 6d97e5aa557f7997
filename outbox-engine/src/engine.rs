//! The sync dispatcher.
//!
//! Orchestrates the drain loop: pull eligible mutations, detect conflicts,
//! apply clean items, park and resolve conflicted ones, and keep the
//! derived status snapshot and event stream current. At most one drain
//! cycle runs at a time; enqueues remain independent of drain state.

use crate::connectivity::ConnectivityMonitor;
use crate::detector::{conflict_record, ConflictDetector, Detection};
use crate::events::{DrainReport, EngineEvent, EventBus, Subscription};
use crate::queue::MutationQueue;
use crate::remote::{ApplyOutcome, ConflictHandler, RemoteApi};
use crate::resolver::{self, Resolution};
use crate::{EngineError, EngineResult};
use chrono::Utc;
use outbox_store::MutationStore;
use outbox_types::{
    ConflictRecord, EntityTarget, Mutation, MutationId, MutationKind, MutationStatus, Payload,
    ResolutionStrategy, SyncStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Apply attempts allowed per mutation before it becomes terminal.
    pub max_attempts: u32,
    /// Safety-net drain interval, in case a connectivity transition event
    /// is missed by the host platform.
    pub poll_interval: Duration,
    /// Automatic resolution strategy. `Manual` (the default) defers every
    /// conflict to the external callback; the engine never silently picks
    /// a winner unless configured to.
    pub strategy: ResolutionStrategy,
    /// Clock-skew tolerance applied to the conflict timestamp gate.
    pub skew_tolerance: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: Mutation::DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_secs(30),
            strategy: ResolutionStrategy::Manual,
            skew_tolerance: chrono::Duration::zero(),
        }
    }
}

/// Outcome of processing one dequeued mutation.
enum ItemOutcome {
    Settled,
    Failed,
    Conflicted(Mutation),
}

/// The offline mutation queue engine.
///
/// Constructed with injected collaborators so multiple engines (or test
/// doubles) can coexist; there is no global instance.
pub struct SyncEngine {
    config: EngineConfig,
    queue: MutationQueue,
    detector: ConflictDetector,
    remote: Arc<dyn RemoteApi>,
    handler: Option<Arc<dyn ConflictHandler>>,
    monitor: Arc<ConnectivityMonitor>,
    events: EventBus,
    is_syncing: AtomicBool,
    /// Last published snapshot; used to suppress no-op status events.
    status: Mutex<SyncStatus>,
    last_error: Mutex<Option<String>>,
    last_synced_at: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl SyncEngine {
    /// Creates an engine over the given store, remote api, and monitor.
    ///
    /// Recovers mutations left `InFlight` by a crash mid-drain back to
    /// `Pending`; the apply contract's idempotency makes redelivery safe.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn MutationStore>,
        remote: Arc<dyn RemoteApi>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> EngineResult<Self> {
        let queue = MutationQueue::new(store, config.max_attempts);
        let recovered = queue.recover()?;
        if recovered > 0 {
            info!(recovered, "recovered in-flight mutations from previous session");
        }

        let detector =
            ConflictDetector::with_skew_tolerance(Arc::clone(&remote), config.skew_tolerance);

        let engine = Self {
            config,
            queue,
            detector,
            remote,
            handler: None,
            monitor,
            events: EventBus::new(),
            is_syncing: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::default()),
            last_error: Mutex::new(None),
            last_synced_at: Mutex::new(None),
        };
        engine.refresh_status()?;
        Ok(engine)
    }

    /// Supplies the external conflict-resolution callback used when the
    /// configured strategy is `Manual`.
    #[must_use]
    pub fn with_conflict_handler(mut self, handler: Arc<dyn ConflictHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The engine's connectivity monitor; the host drives `set_online`.
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Registers an event subscriber.
    pub fn subscribe(&self) -> (Subscription, UnboundedReceiver<EngineEvent>) {
        self.events.subscribe()
    }

    /// Current derived status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.lock().unwrap().clone()
    }

    /// Every queued mutation, in enqueue order (for initial render).
    pub fn list_all(&self) -> EngineResult<Vec<Mutation>> {
        self.queue.list_all()
    }

    /// Presentation records for every currently conflicted mutation.
    pub fn conflicts(&self) -> EngineResult<Vec<ConflictRecord>> {
        Ok(self
            .queue
            .list_all()?
            .iter()
            .filter(|m| m.status == MutationStatus::Conflicted)
            .map(conflict_record)
            .collect())
    }

    // ── Enqueue ──────────────────────────────────────────────────

    /// Queues a write for later application. Safe to call at any time,
    /// including while a drain is in progress.
    pub fn enqueue(
        &self,
        kind: MutationKind,
        target: EntityTarget,
        payload: Payload,
    ) -> EngineResult<MutationId> {
        let mutation = self.queue.enqueue(kind, target, payload)?;
        self.refresh_status()?;
        Ok(mutation.id)
    }

    // ── Drain ────────────────────────────────────────────────────

    /// Runs one drain cycle if online and not already draining. Returns
    /// `None` when the cycle did not start (offline, or another drain is
    /// running); per-item failures are reported, not returned as errors.
    pub async fn drain(&self) -> EngineResult<Option<DrainReport>> {
        if !self.monitor.is_online() {
            return Ok(None);
        }
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("drain already in progress");
            return Ok(None);
        }

        let result = self.drain_cycle().await;
        self.is_syncing.store(false, Ordering::SeqCst);

        match result {
            Ok(report) => {
                if report.settled > 0 {
                    *self.last_synced_at.lock().unwrap() = Some(Utc::now());
                }
                self.refresh_status()?;
                self.events.emit(&EngineEvent::DrainComplete(report));
                info!(
                    settled = report.settled,
                    failed = report.failed,
                    conflicted = report.conflicted,
                    "drain complete"
                );
                Ok(Some(report))
            }
            Err(err) => {
                // Store-level failures abort the cycle; without durable
                // bookkeeping continuing is unsafe.
                warn!(error = %err, "drain aborted");
                self.note_error(err.to_string());
                let _ = self.refresh_status();
                Err(err)
            }
        }
    }

    /// Drains immediately, erroring if the monitor reports offline.
    pub async fn force_drain(&self) -> EngineResult<Option<DrainReport>> {
        if !self.monitor.is_online() {
            return Err(EngineError::Offline);
        }
        self.drain().await
    }

    async fn drain_cycle(&self) -> EngineResult<DrainReport> {
        self.refresh_status()?;
        let mut report = DrainReport::default();
        // Terminal-until-explicit-action states are only re-attempted on
        // the first pass; later passes pick up pending work only (newly
        // enqueued or resolved-to-pending items).
        let mut first_pass = true;
        // Conflicts are resolved at most once per cycle; anything still
        // conflicted afterwards waits for the next cycle.
        let mut resolution_done = false;
        // Items parked `Conflicted` in an earlier cycle (deferred decision,
        // failed callback) re-enter resolution this cycle.
        let mut carryover = self.queue.dequeue_batch(&[MutationStatus::Conflicted])?;
        // Entities with a stuck mutation, keyed to the earliest stuck id.
        // Later mutations for these entities stay pending; a newer write
        // must never land before an undelivered older one.
        let mut blocked: HashMap<EntityTarget, MutationId> = HashMap::new();
        for mutation in &carryover {
            blocked.entry(mutation.target.clone()).or_insert(mutation.id);
        }

        loop {
            if !self.monitor.is_online() {
                debug!("connectivity lost, stopping drain");
                break;
            }

            let statuses: &[MutationStatus] = if first_pass {
                &[MutationStatus::Pending, MutationStatus::Failed]
            } else {
                &[MutationStatus::Pending]
            };
            first_pass = false;

            let batch = self.queue.dequeue_batch(statuses)?;
            if batch.is_empty() && carryover.is_empty() {
                break;
            }
            debug!(items = batch.len(), "draining batch");

            let mut conflicted = std::mem::take(&mut carryover);
            let mut progressed = false;
            for mutation in batch {
                if !self.monitor.is_online() {
                    break;
                }
                // A stuck same-entity predecessor holds this item back
                // until it is delivered or explicitly cleared.
                if let Some(first) = blocked.get(&mutation.target) {
                    if *first < mutation.id {
                        debug!(id = %mutation.id, target = %mutation.target, "held behind a stuck predecessor");
                        continue;
                    }
                }
                progressed = true;
                let id = mutation.id;
                let target = mutation.target.clone();
                // One item's failure never blocks other entities; only
                // store-level errors propagate and abort the cycle.
                match self.process_item(mutation).await? {
                    ItemOutcome::Settled => {
                        report.settled += 1;
                        if blocked.get(&target) == Some(&id) {
                            blocked.remove(&target);
                        }
                    }
                    ItemOutcome::Failed => {
                        report.failed += 1;
                        blocked.entry(target).or_insert(id);
                    }
                    ItemOutcome::Conflicted(mutation) => {
                        report.conflicted += 1;
                        blocked.entry(target).or_insert(id);
                        conflicted.push(mutation);
                    }
                }
            }

            if !conflicted.is_empty() {
                let records: Vec<ConflictRecord> = conflicted.iter().map(conflict_record).collect();
                self.events.emit(&EngineEvent::ConflictsDetected(records));
                if !resolution_done {
                    resolution_done = true;
                    progressed = true;
                    self.resolve_batch(&conflicted, &mut report).await?;
                }
            }

            self.refresh_status()?;
            if !progressed {
                break;
            }
        }

        Ok(report)
    }

    /// Detects and applies a single dequeued mutation.
    async fn process_item(&self, mutation: Mutation) -> EngineResult<ItemOutcome> {
        let id = mutation.id;
        let mutation = self.queue.mark_in_flight(id)?;

        let detection = match self.detector.detect(&mutation).await {
            Ok(detection) => detection,
            Err(EngineError::Transport(message)) => return self.fail_item(id, &message),
            Err(other) => return Err(other),
        };

        match detection {
            Detection::Clean => match self.remote.apply(&mutation).await {
                Ok(ApplyOutcome::Applied) => self.settle_item(mutation),
                Ok(ApplyOutcome::NotFound) => {
                    if mutation.kind == MutationKind::Delete {
                        // Already gone remotely; the delete's end state holds.
                        self.settle_item(mutation)
                    } else {
                        let parked = self.queue.mark_conflicted(id, None)?;
                        Ok(ItemOutcome::Conflicted(parked))
                    }
                }
                Ok(ApplyOutcome::ServerError(message)) => self.fail_item(id, &message),
                Err(EngineError::Transport(message)) => self.fail_item(id, &message),
                Err(other) => Err(other),
            },
            Detection::Conflict(snapshot) => {
                let parked = self.queue.mark_conflicted(id, snapshot)?;
                Ok(ItemOutcome::Conflicted(parked))
            }
        }
    }

    /// Settles a mutation after a confirmed successful apply (or an
    /// explicit keep-server decision) and removes it from the queue.
    fn settle_item(&self, mut mutation: Mutation) -> EngineResult<ItemOutcome> {
        self.queue.mark_settled(mutation.id)?;
        mutation.settle();
        self.events.emit(&EngineEvent::ItemSettled(mutation));
        Ok(ItemOutcome::Settled)
    }

    fn fail_item(&self, id: MutationId, message: &str) -> EngineResult<ItemOutcome> {
        let failed = self.queue.mark_failed(id, message)?;
        if failed.retries_exhausted() {
            // Surface the terminal state, not just the last transport error.
            self.note_error(EngineError::RetriesExhausted(id.to_string()).to_string());
        } else {
            self.note_error(message.to_string());
        }
        self.events.emit(&EngineEvent::ItemFailed(failed));
        Ok(ItemOutcome::Failed)
    }

    /// Resolves the cycle's accumulated conflicts: with an automatic
    /// strategy, immediately; with `Manual`, through the external callback,
    /// invoked once with the whole batch. Callback failure leaves the items
    /// conflicted for the next cycle.
    async fn resolve_batch(
        &self,
        conflicted: &[Mutation],
        report: &mut DrainReport,
    ) -> EngineResult<()> {
        if self.config.strategy != ResolutionStrategy::Manual {
            for mutation in conflicted {
                self.apply_resolution(mutation, self.config.strategy, report)?;
            }
            return Ok(());
        }

        let Some(handler) = &self.handler else {
            debug!(
                conflicts = conflicted.len(),
                "no conflict handler configured, items remain conflicted"
            );
            return Ok(());
        };

        let records: Vec<ConflictRecord> = conflicted.iter().map(conflict_record).collect();
        match handler.resolve_conflicts(records).await {
            Ok(choices) => {
                for mutation in conflicted {
                    if let Some(strategy) = choices.get(&mutation.id) {
                        self.apply_resolution(mutation, *strategy, report)?;
                    }
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "conflict callback failed, items remain conflicted");
                self.note_error(format!("conflict callback failed: {err}"));
                Ok(())
            }
        }
    }

    fn apply_resolution(
        &self,
        mutation: &Mutation,
        strategy: ResolutionStrategy,
        report: &mut DrainReport,
    ) -> EngineResult<()> {
        match resolver::resolve(mutation, mutation.remote_snapshot.as_ref(), strategy) {
            Resolution::Reapply(resolved) => {
                debug!(id = %resolved.id, %strategy, "conflict resolved, re-entering queue");
                self.queue.put_resolved(&resolved)
            }
            Resolution::Settle => {
                report.settled += 1;
                let mut settled = mutation.clone();
                self.queue.mark_settled(settled.id)?;
                settled.settle();
                self.events.emit(&EngineEvent::ItemSettled(settled));
                Ok(())
            }
            Resolution::Defer => Ok(()),
        }
    }

    // ── Administrative operations ────────────────────────────────

    /// Returns every terminal `Failed` mutation to `Pending` with a fresh
    /// attempt budget.
    pub fn retry_failed(&self) -> EngineResult<usize> {
        let reset = self.queue.retry_failed()?;
        self.refresh_status()?;
        Ok(reset)
    }

    /// Discards every `Failed` mutation.
    pub fn clear_failed(&self) -> EngineResult<usize> {
        let removed = self.queue.clear_failed()?;
        self.refresh_status()?;
        Ok(removed)
    }

    /// Discards every `Conflicted` mutation; the server values stand.
    pub fn clear_conflicts(&self) -> EngineResult<usize> {
        let removed = self.queue.clear_conflicts()?;
        self.refresh_status()?;
        Ok(removed)
    }

    /// Discards the entire queue.
    pub fn clear_all(&self) -> EngineResult<()> {
        self.queue.clear_all()?;
        self.refresh_status()?;
        Ok(())
    }

    // ── Background loop ──────────────────────────────────────────

    /// Runs the dispatcher loop: drains on transition to online and on the
    /// safety-net poll interval. Returns when the monitor is gone.
    pub async fn run(&self) {
        let mut transitions = self.monitor.subscribe();
        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = transitions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *transitions.borrow_and_update();
                    if online {
                        info!("online, draining queue");
                        if let Err(err) = self.drain().await {
                            warn!(error = %err, "drain failed");
                        }
                    } else {
                        // Reflect the offline transition in the status.
                        let _ = self.refresh_status();
                    }
                }
                _ = tick.tick() => {
                    if self.monitor.is_online() {
                        if let Err(err) = self.drain().await {
                            warn!(error = %err, "periodic drain failed");
                        }
                    }
                }
            }
        }
    }

    /// Spawns `run` onto the current tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run().await })
    }

    // ── Status bookkeeping ───────────────────────────────────────

    fn note_error(&self, message: String) {
        *self.last_error.lock().unwrap() = Some(message);
    }

    /// Recomputes the derived status from the queue, persists it, and
    /// notifies subscribers when it changed.
    fn refresh_status(&self) -> EngineResult<()> {
        let (pending, failed, conflicted) = self.queue.counts()?;

        let next = {
            let next = SyncStatus {
                online: self.monitor.is_online(),
                syncing: self.is_syncing.load(Ordering::SeqCst),
                degraded: self.queue.is_degraded(),
                pending,
                failed,
                conflicted,
                last_synced_at: *self.last_synced_at.lock().unwrap(),
                last_error: self.last_error.lock().unwrap().clone(),
            };
            let mut guard = self.status.lock().unwrap();
            if next == *guard {
                return Ok(());
            }
            *guard = next.clone();
            next
        };

        self.queue.write_status(&next)?;
        self.events.emit(&EngineEvent::StatusChanged(next));
        Ok(())
    }
}
