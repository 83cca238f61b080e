use thiserror::Error;
use uuid::Uuid;

use crate::checkpoint::CheckpointError;

/// Errors that end a sync run.
///
/// By the time one of these reaches the caller the run row has already
/// been finalized as failed (except `AlreadyRunning`, which never
/// creates a row).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run holds the claim.
    #[error("A sync is already running (run {run_id})")]
    AlreadyRunning { run_id: Uuid },

    /// Checkpoint write the run could not proceed without.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Id discovery exhausted its retries.
    #[error("Id discovery failed: {message}")]
    Discovery { message: String },

    /// The run was cancelled or the watchdog declared a stall.
    #[error("Sync aborted: {message}")]
    Aborted { message: String },

    /// The run finished its passes short of the expected total.
    #[error("Sync incomplete: covered {covered} of {expected} expected records")]
    Incomplete { covered: i64, expected: i64 },

    /// The sync task panicked and was caught by the supervisor.
    #[error("Sync task panicked: {message}")]
    Panicked { message: String },
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
