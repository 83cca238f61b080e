//! Shared sync engine types and constants.

use std::time::Duration;

/// Default number of concurrent per-contact fetches in a window.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 15;

/// Default number of fetched contacts buffered before a flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;

/// Default deadline for a single contact fetch.
pub const DEFAULT_PER_ITEM_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of retry passes over failed ids.
pub const DEFAULT_MAX_RETRY_PASSES: u32 = 5;

/// Default per-item timeout increase applied on each retry pass.
pub const DEFAULT_RETRY_TIMEOUT_STEP: Duration = Duration::from_secs(15);

/// Default unit of the delay inserted before each retry pass.
pub const DEFAULT_RETRY_PASS_DELAY_UNIT: Duration = Duration::from_secs(1);

/// Default deadline for one whole id discovery attempt.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default number of whole-operation retries for id discovery.
pub const DEFAULT_DISCOVERY_RETRIES: u32 = 3;

/// Default inactivity threshold before the watchdog declares a stall.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Default watchdog polling interval.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// Options for a bulk contact sync.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Concurrent fetches per window; also the window width.
    pub fetch_concurrency: usize,
    /// Buffered contacts that trigger a flush-and-checkpoint.
    pub flush_threshold: usize,
    /// Deadline for a single contact fetch on the first pass.
    pub per_item_timeout: Duration,
    /// Maximum retry passes over failed ids.
    pub max_retry_passes: u32,
    /// Per-item timeout increase per retry pass.
    pub retry_timeout_step: Duration,
    /// Inter-pass delay unit; pass `n` waits `n` units.
    pub retry_pass_delay_unit: Duration,
    /// Deadline for one id discovery attempt.
    pub discovery_timeout: Duration,
    /// Whole-operation retries for id discovery.
    pub discovery_retries: u32,
    /// Inactivity threshold before the watchdog aborts the run.
    pub stall_threshold: Duration,
    /// Watchdog polling interval.
    pub watchdog_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            per_item_timeout: DEFAULT_PER_ITEM_TIMEOUT,
            max_retry_passes: DEFAULT_MAX_RETRY_PASSES,
            retry_timeout_step: DEFAULT_RETRY_TIMEOUT_STEP,
            retry_pass_delay_unit: DEFAULT_RETRY_PASS_DELAY_UNIT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            discovery_retries: DEFAULT_DISCOVERY_RETRIES,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
        }
    }
}

/// Final report of a sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The run this report describes.
    pub run_id: uuid::Uuid,
    /// Whether the run covered the expected total.
    pub completed: bool,
    /// Expected record count, if discovery could establish one.
    pub total_expected: Option<i64>,
    /// Records fetched successfully.
    pub fetched: i64,
    /// Rows inserted.
    pub created: i64,
    /// Rows updated.
    pub updated: i64,
    /// Records that failed to persist locally.
    pub errors: i64,
    /// Retry passes actually swept.
    pub retry_passes: u32,
    /// Ids still failing when the run ended (bounded sample).
    pub failed_ids: Vec<i64>,
}
