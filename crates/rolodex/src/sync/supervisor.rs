//! Last-resort safety net around the orchestrator.
//!
//! The orchestrator finalizes its own run on every error path it knows
//! about. What it cannot handle is its own task panicking: that would
//! leave a `running` row behind forever, blocking every future claim.
//! The supervisor runs the orchestrator in a spawned task, catches the
//! panic, and best-effort fails the orphaned row. It lives outside the
//! state machine so both halves stay independently testable.

use std::sync::Arc;

use crate::entity::sync_type::SyncType;
use crate::remote::RemoteDirectory;

use super::errors::{Result, SyncError};
use super::orchestrator::SyncOrchestrator;
use super::progress::ProgressCallback;
use super::types::SyncReport;

/// Run a sync under panic supervision.
pub async fn run_supervised<C>(
    orchestrator: Arc<SyncOrchestrator<C>>,
    on_progress: Option<ProgressCallback>,
) -> Result<SyncReport>
where
    C: RemoteDirectory + ?Sized + 'static,
{
    let store = orchestrator.checkpoint_store().clone();
    let handle =
        tokio::spawn(async move { orchestrator.start_sync(on_progress.as_ref()).await });

    match handle.await {
        Ok(result) => result,
        Err(join_error) => {
            let message = if join_error.is_panic() {
                let payload = join_error.into_panic();
                if let Some(s) = payload.downcast_ref::<&str>() {
                    format!("Sync task panicked: {s}")
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    format!("Sync task panicked: {s}")
                } else {
                    "Sync task panicked".to_string()
                }
            } else {
                "Sync task was aborted".to_string()
            };

            tracing::error!(message = %message, "Sync task did not finish cleanly");
            if let Err(e) = store.mark_running_failed(SyncType::ContactBulk, &message).await {
                tracing::error!(error = %e, "Could not fail orphaned sync run");
            }

            Err(SyncError::Panicked { message })
        }
    }
}
