//! The `sync` command: run one supervised bulk sync.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use rolodex::connect_and_migrate;
use rolodex::sync::{run_supervised, SyncError, SyncOptions, SyncOrchestrator};
use rolodex::{CheckpointStore, PersistenceSink};

use crate::directory::FileDirectory;
use crate::progress::ProgressReporter;
use crate::{shutdown, SyncArgs};

pub(crate) async fn handle_sync(
    source: &Path,
    args: SyncArgs,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(connect_and_migrate(database_url).await?);
    let client = Arc::new(FileDirectory::load(source)?);
    let options = merge_options(&args);

    let shutdown_token = shutdown::install_handler();
    let orchestrator = Arc::new(
        SyncOrchestrator::new(
            client,
            CheckpointStore::new(Arc::clone(&db)),
            PersistenceSink::new(db),
            options,
        )
        .with_shutdown_token(shutdown_token),
    );

    let reporter = Arc::new(ProgressReporter::new());
    let result = run_supervised(Arc::clone(&orchestrator), Some(reporter.as_callback())).await;
    reporter.finish();

    match result {
        Ok(report) => {
            println!(
                "{} Synced {} contacts ({} created, {} updated) in {} retry pass(es)",
                style("✓").green(),
                report.fetched,
                report.created,
                report.updated,
                report.retry_passes
            );
            Ok(())
        }
        Err(SyncError::AlreadyRunning { run_id }) => {
            Err(format!(
                "A sync is already running (run {}). Use 'rolodex cancel' if it is stale.",
                run_id
            )
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

fn merge_options(args: &SyncArgs) -> SyncOptions {
    let mut options = SyncOptions::default();
    if let Some(concurrency) = args.concurrency {
        options.fetch_concurrency = concurrency.max(1);
    }
    if let Some(threshold) = args.flush_threshold {
        options.flush_threshold = threshold.max(1);
    }
    if let Some(secs) = args.timeout_secs {
        options.per_item_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(passes) = args.max_retry_passes {
        options.max_retry_passes = passes;
    }
    if let Some(secs) = args.stall_secs {
        options.stall_threshold = Duration::from_secs(secs.max(1));
    }
    options
}
