//! The bulk synchronization engine.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `SyncOptions`, `SyncReport`, constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`fetcher`] - Concurrent window fetching with dual timeouts
//! - [`retry`] - Retry pass planning over failed ids
//! - [`watchdog`] - Stall detection and run abort
//! - [`orchestrator`] - The run state machine
//! - [`supervisor`] - Panic safety net around the orchestrator
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rolodex::sync::{SyncOptions, SyncOrchestrator};
//! use rolodex::{CheckpointStore, PersistenceSink};
//!
//! let db = Arc::new(rolodex::connect_and_migrate("sqlite://rolodex.db?mode=rwc").await?);
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(client),
//!     CheckpointStore::new(Arc::clone(&db)),
//!     PersistenceSink::new(db),
//!     SyncOptions::default(),
//! );
//! let report = orchestrator.start_sync(None).await?;
//! println!("Synced {} contacts", report.fetched);
//! ```

mod errors;
pub mod fetcher;
mod orchestrator;
mod progress;
pub mod retry;
mod supervisor;
mod types;
pub mod watchdog;

pub use errors::{Result, SyncError};
pub use fetcher::{fetch_batch, BatchOutcome};
pub use orchestrator::SyncOrchestrator;
pub use progress::{emit, ProgressCallback, SyncProgress};
pub use retry::{pass_concurrency, pass_delay, pass_timeout, plan_passes, PassPlan};
pub use supervisor::run_supervised;
pub use types::{SyncOptions, SyncReport};
pub use types::{
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_FLUSH_THRESHOLD, DEFAULT_MAX_RETRY_PASSES,
    DEFAULT_PER_ITEM_TIMEOUT, DEFAULT_STALL_THRESHOLD, DEFAULT_WATCHDOG_INTERVAL,
};
pub use watchdog::{spawn_watchdog, ActivityTracker, WatchdogGuard};
