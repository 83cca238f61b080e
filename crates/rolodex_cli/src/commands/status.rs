//! The `status` command: show the latest sync run.

use console::style;
use rolodex::connect_and_migrate;
use rolodex::{CheckpointStore, SyncRunModel, SyncStatus, SyncType};

pub(crate) async fn handle_status(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = connect_and_migrate(database_url).await?;
    let store = CheckpointStore::new(db);

    match store.latest_run(SyncType::ContactBulk).await? {
        Some(run) => print_run(&run),
        None => println!("No sync runs recorded."),
    }

    Ok(())
}

fn print_run(run: &SyncRunModel) {
    let status = match run.status {
        SyncStatus::Running => style(run.status.to_string()).yellow(),
        SyncStatus::Completed => style(run.status.to_string()).green(),
        SyncStatus::Failed => style(run.status.to_string()).red(),
    };

    println!("Run        {}", run.id);
    println!("Status     {} ({})", status, run.phase);
    println!("Started    {}", run.started_at.format("%Y-%m-%d %H:%M:%S %Z"));
    match run.completed_at {
        Some(completed) => println!("Finished   {}", completed.format("%Y-%m-%d %H:%M:%S %Z")),
        None => println!("Finished   -"),
    }

    match run.total_expected {
        Some(expected) => println!("Fetched    {} of {} expected", run.fetched_count, expected),
        None => println!("Fetched    {}", run.fetched_count),
    }
    println!(
        "Rows       {} created, {} updated, {} errors",
        run.created_count, run.updated_count, run.error_count
    );

    if let Some(fraction) = run.progress_fraction() {
        println!("Progress   {:.1}%", fraction * 100.0);
    }
    if let Some(resume_id) = run.last_processed_id {
        println!("Checkpoint after id {}", resume_id);
    }
    if let Some(ref message) = run.error_message {
        println!("Message    {}", style(message).red());
    }
}
