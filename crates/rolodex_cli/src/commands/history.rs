//! The `history` command: paginated past runs.

use console::style;
use rolodex::connect_and_migrate;
use rolodex::{CheckpointStore, Pagination, SyncStatus, SyncType};

pub(crate) async fn handle_history(
    database_url: &str,
    page: u64,
    per_page: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = connect_and_migrate(database_url).await?;
    let store = CheckpointStore::new(db);

    let result = store
        .run_history(SyncType::ContactBulk, Pagination::new(page, per_page))
        .await?;

    if result.items.is_empty() {
        println!("No sync runs on page {}.", page);
        return Ok(());
    }

    for run in &result.items {
        let status = match run.status {
            SyncStatus::Running => style(format!("{:9}", "running")).yellow(),
            SyncStatus::Completed => style(format!("{:9}", "completed")).green(),
            SyncStatus::Failed => style(format!("{:9}", "failed")).red(),
        };
        let duration = match run.completed_at {
            Some(completed) => {
                let secs = (completed - run.started_at).num_seconds().max(0);
                format!("{}s", secs)
            }
            None => "-".to_string(),
        };

        println!(
            "{}  {}  {:>6} fetched  {:>6} created  {:>6} updated  {:>4} errors  {:>6}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            status,
            run.fetched_count,
            run.created_count,
            run.updated_count,
            run.error_count,
            duration
        );
    }

    println!(
        "\nPage {} of {} ({} runs total)",
        result.page + 1,
        result.total_pages.max(1),
        result.total
    );

    Ok(())
}
