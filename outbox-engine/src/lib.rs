//! Offline mutation queue and conflict-resolution engine.
//!
//! Lets a client keep accepting writes while disconnected from its backing
//! server and reconcile them once connectivity returns. Every create, update,
//! and delete is captured in a durable queue and replayed against the server;
//! divergence between local and server state surfaces as a resolvable
//! conflict instead of an overwrite.
//!
//! # Components
//!
//! - **Queue**: durable, FIFO-per-entity record of pending writes
//! - **Connectivity monitor**: online/offline signal source
//! - **Detector**: two-stage conflict gate against authoritative state
//! - **Resolver**: keep-local / keep-server / merge / manual execution
//! - **Dispatcher**: the drain loop, retry policy, and event stream
//!
//! Guarantees at-least-once delivery with detectable, resolvable divergence
//! for a single client against one authoritative server. Not a CRDT system:
//! conflicts are decided per record or per field, never merged commutatively.
//!
//! # Example
//!
//! ```no_run
//! use outbox_engine::{ConnectivityMonitor, EngineConfig, SyncEngine};
//! use outbox_store::SqliteStore;
//! use std::sync::Arc;
//!
//! # use outbox_engine::{ApplyOutcome, EngineResult, FetchOutcome, RemoteApi};
//! # use outbox_types::{EntityTarget, Mutation};
//! # struct Api;
//! # #[async_trait::async_trait]
//! # impl RemoteApi for Api {
//! #     async fn apply(&self, _: &Mutation) -> EngineResult<ApplyOutcome> { todo!() }
//! #     async fn fetch_state(&self, _: &EntityTarget) -> EngineResult<FetchOutcome> { todo!() }
//! # }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::new("outbox.db")?);
//! let monitor = Arc::new(ConnectivityMonitor::new(false));
//! let engine = Arc::new(SyncEngine::new(
//!     EngineConfig::default(),
//!     store,
//!     Arc::new(Api),
//!     monitor,
//! )?);
//! # Ok(())
//! # }
//! ```

mod connectivity;
pub mod detector;
mod engine;
mod error;
mod events;
mod queue;
pub mod remote;
pub mod resolver;

pub use connectivity::ConnectivityMonitor;
pub use detector::{conflict_record, field_diffs, ConflictDetector, Detection, AUDIT_FIELDS};
pub use engine::{EngineConfig, SyncEngine};
pub use error::{EngineError, EngineResult};
pub use events::{DrainReport, EngineEvent, EventBus, Subscription};
pub use queue::MutationQueue;
pub use remote::{ApplyOutcome, ConflictHandler, FetchOutcome, RemoteApi};
pub use resolver::{resolve, Resolution};
