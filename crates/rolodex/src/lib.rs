//! Rolodex - a resumable bulk synchronization engine for contact directories.
//!
//! Rolodex reconciles tens of thousands of remote contact records into a
//! local database through a slow, unreliable remote API. Runs are
//! checkpointed as they go, so an interrupted sync picks up where the
//! last durable write left off instead of starting over.
//!
//! # Features
//!
//! - `sqlite` / `postgres` - database backends (sqlite is the default)
//! - `migrate` - enables [`connect_and_migrate`] and the migration module
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rolodex::{connect_and_migrate, CheckpointStore, PersistenceSink};
//! use rolodex::sync::{SyncOptions, SyncOrchestrator};
//!
//! let db = Arc::new(connect_and_migrate("sqlite://rolodex.db?mode=rwc").await?);
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(my_directory_client),
//!     CheckpointStore::new(Arc::clone(&db)),
//!     PersistenceSink::new(db),
//!     SyncOptions::default(),
//! );
//! let report = orchestrator.start_sync(None).await?;
//! ```

pub mod checkpoint;
pub mod db;
pub mod entity;
pub mod persist;
pub mod remote;
pub mod sync;

#[cfg(feature = "migrate")]
pub mod migration;

pub use checkpoint::{
    CheckpointError, CheckpointStore, PaginatedResult, Pagination, ProgressUpdate, ResumePoint,
    RunCounts,
};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use persist::{PersistenceSink, UpsertStats};
pub use remote::{RemoteContact, RemoteDirectory, RemoteError};
pub use sync::{SyncError, SyncOptions, SyncOrchestrator, SyncReport};
