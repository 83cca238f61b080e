//! Rolodex CLI - operator tooling for the contact sync engine.

mod commands;
mod directory;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rolodex")]
#[command(version)]
#[command(about = "Resumable bulk contact synchronization")]
#[command(
    long_about = "Rolodex reconciles a remote contact directory into a local database. \
Runs are checkpointed as they go: an interrupted sync resumes from the last \
durable write instead of starting over, and a stalled run is detected and \
failed by a watchdog."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync from a directory export:
        $ rolodex sync contacts.json

    Sync with a wider fetch window and a shorter per-contact deadline:
        $ rolodex sync contacts.json --concurrency 30 --timeout-secs 5

    Inspect the latest run:
        $ rolodex status

    Page through past runs:
        $ rolodex history --page 0 --per-page 20

ENVIRONMENT VARIABLES
    DATABASE_URL    Database connection string (default: sqlite://rolodex.db?mode=rwc)
    RUST_LOG        Log filter for non-TTY output (default: rolodex=info,rolodex_cli=info)
"#)]
struct Cli {
    /// Database connection string
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://rolodex.db?mode=rwc",
        global = true
    )]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run a bulk contact sync
    Sync {
        /// Path to a JSON directory export (array of contact objects)
        source: PathBuf,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Show the latest sync run
    Status,
    /// Show past sync runs
    History {
        /// Page number (0-indexed)
        #[arg(short, long, default_value_t = 0)]
        page: u64,

        /// Runs per page
        #[arg(long, default_value_t = 10)]
        per_page: u64,
    },
    /// Mark the running sync as failed, releasing its claim
    ///
    /// Useful after a sync process was killed and left a stale running
    /// row behind. Does not terminate a sync owned by another process.
    Cancel,
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

/// Sync tuning flags; unset flags use the engine defaults.
#[derive(Debug, Clone, clap::Args)]
struct SyncArgs {
    /// Maximum concurrent contact fetches (also the window width)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Buffered contacts per database flush
    #[arg(long)]
    flush_threshold: Option<usize>,

    /// Per-contact fetch deadline in seconds
    #[arg(short = 't', long)]
    timeout_secs: Option<u64>,

    /// Maximum retry passes over failed ids
    #[arg(long)]
    max_retry_passes: Option<u32>,

    /// Seconds without progress before the watchdog fails the run
    #[arg(long)]
    stall_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for non-TTY mode (structured logging)
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("rolodex=info,rolodex_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let database_url = cli.database_url;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Sync { source, sync_opts } => {
            commands::sync::handle_sync(&source, sync_opts, &database_url).await?;
        }
        Commands::Status => {
            commands::status::handle_status(&database_url).await?;
        }
        Commands::History { page, per_page } => {
            commands::history::handle_history(&database_url, page, per_page).await?;
        }
        Commands::Cancel => {
            commands::cancel::handle_cancel(&database_url).await?;
        }
    }

    Ok(())
}
