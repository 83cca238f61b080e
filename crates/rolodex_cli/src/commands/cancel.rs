//! The `cancel` command: fail the running run and release its claim.

use console::style;
use rolodex::connect_and_migrate;
use rolodex::{CheckpointStore, SyncType};

pub(crate) async fn handle_cancel(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = connect_and_migrate(database_url).await?;
    let store = CheckpointStore::new(db);

    match store
        .mark_running_failed(SyncType::ContactBulk, "Sync cancelled by operator")
        .await?
    {
        Some(run_id) => {
            println!("{} Marked run {} as failed.", style("✓").green(), run_id);
        }
        None => {
            println!("No sync is running.");
        }
    }

    Ok(())
}
