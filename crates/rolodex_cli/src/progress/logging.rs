use rolodex::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub(crate) struct LoggingReporter;

impl LoggingReporter {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::Started { total } => {
                tracing::info!(total = ?total, "Starting contact sync");
            }

            SyncProgress::DiscoveringIds => {
                tracing::info!("Discovering remote ids");
            }

            SyncProgress::DiscoveredPage {
                fetched_so_far,
                total,
            } => {
                tracing::debug!(fetched_so_far, total = ?total, "Discovered id page");
            }

            SyncProgress::DiscoveryComplete { total } => {
                tracing::info!(total, "Id discovery complete");
            }

            SyncProgress::Resuming {
                resume_id,
                resume_index,
            } => {
                tracing::info!(resume_id, resume_index, "Resuming from checkpoint");
            }

            SyncProgress::ResumePointMissing { resume_id } => {
                tracing::warn!(resume_id, "Checkpoint id missing remotely, starting over");
            }

            SyncProgress::BatchComplete {
                batch_size,
                total_processed,
                total,
            } => {
                tracing::debug!(batch_size, total_processed, total = ?total, "Fetch window complete");
            }

            SyncProgress::PersistingBatch { count } => {
                tracing::debug!(count, "Flushing contacts to database");
            }

            SyncProgress::RetryPass {
                pass,
                remaining,
                concurrency,
                per_item_timeout_secs,
            } => {
                tracing::info!(
                    pass,
                    remaining,
                    concurrency,
                    per_item_timeout_secs,
                    "Starting retry pass"
                );
            }

            SyncProgress::RetryPassComplete {
                pass,
                recovered,
                still_failing,
            } => {
                tracing::info!(pass, recovered, still_failing, "Retry pass complete");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            SyncProgress::Completed {
                fetched,
                created,
                updated,
                retry_passes,
            } => {
                tracing::info!(fetched, created, updated, retry_passes, "Sync complete");
            }

            SyncProgress::Error { message } => {
                tracing::error!(message = %message, "Sync failed");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
