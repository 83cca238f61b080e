//! Progress reporting types for sync operations.
//!
//! Observers receive a strictly ordered stream per run: `Started`, then
//! any number of intermediate events, then exactly one of `Completed` or
//! `Error`.

/// Progress events emitted during a sync run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A run was claimed and is starting.
    Started {
        /// Remote total, if the count endpoint answered.
        total: Option<u64>,
    },

    /// Id discovery began.
    DiscoveringIds,

    /// Discovery fetched another page of ids.
    DiscoveredPage {
        /// Ids enumerated so far.
        fetched_so_far: usize,
        /// Expected total, if known.
        total: Option<u64>,
    },

    /// Discovery finished.
    DiscoveryComplete {
        /// Number of ids enumerated.
        total: usize,
    },

    /// Resuming from a previous run's checkpoint.
    Resuming {
        /// External id of the last durably persisted record.
        resume_id: i64,
        /// Position of that id in the fresh id list.
        resume_index: usize,
    },

    /// The previous checkpoint id no longer exists remotely; starting over.
    ResumePointMissing {
        /// The checkpoint id that could not be found.
        resume_id: i64,
    },

    /// A fetch window finished and its outcome was recorded.
    BatchComplete {
        /// Records fetched in this window.
        batch_size: usize,
        /// Records processed so far this run, successes and failures.
        total_processed: usize,
        /// Expected total, if known.
        total: Option<u64>,
    },

    /// Flushing buffered contacts to the database.
    PersistingBatch {
        /// Number of contacts in the flush.
        count: usize,
    },

    /// A retry pass over failed ids is starting.
    RetryPass {
        /// Pass number (1-indexed).
        pass: u32,
        /// Failed ids entering this pass.
        remaining: usize,
        /// Window width used for this pass.
        concurrency: usize,
        /// Per-item deadline used for this pass, in seconds.
        per_item_timeout_secs: u64,
    },

    /// A retry pass finished.
    RetryPassComplete {
        /// Pass number (1-indexed).
        pass: u32,
        /// Ids recovered during this pass.
        recovered: usize,
        /// Ids still failing after this pass.
        still_failing: usize,
    },

    /// Warning message (non-fatal).
    Warning {
        /// Warning message.
        message: String,
    },

    /// The run reached full coverage and was finalized as completed.
    Completed {
        /// Records fetched successfully.
        fetched: i64,
        /// Rows inserted.
        created: i64,
        /// Rows updated.
        updated: i64,
        /// Retry passes swept.
        retry_passes: u32,
    },

    /// The run ended in failure. Emitted exactly once, with the cause.
    Error {
        /// Terminating cause.
        message: String,
    },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// Avoids repetitive `if let Some(cb) = ...` at every call site.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
