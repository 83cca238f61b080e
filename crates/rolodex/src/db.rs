//! Database connection utilities.

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Configure SQLite-specific pragmas for better performance and concurrency.
///
/// This sets:
/// - `journal_mode=WAL` - Write-ahead logging so readers don't block the
///   sync engine's writer
/// - `busy_timeout=5000` - Wait up to 5 seconds for locks instead of failing
/// - `synchronous=NORMAL` - Safe with WAL and faster than FULL
async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm::{ConnectionTrait, Statement};

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA journal_mode=WAL".to_string(),
    ))
    .await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA busy_timeout=5000".to_string(),
    ))
    .await?;

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA synchronous=NORMAL".to_string(),
    ))
    .await?;

    Ok(())
}

/// Establish a connection to the database.
///
/// SQLite connections are automatically configured with WAL journaling,
/// a 5 second busy timeout, and NORMAL synchronous mode. Long sync runs
/// write checkpoints concurrently with status queries, so the pragmas
/// matter in practice.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    if database_url.starts_with("sqlite://") {
        configure_sqlite(&db).await?;
    }

    Ok(db)
}

/// Establish a connection to the database and run all pending migrations.
///
/// The recommended way to initialize the database for applications using
/// rolodex. Ensures the schema is always up-to-date.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established or migrations fail.
///
/// # Example
/// ```ignore
/// let db = rolodex::connect_and_migrate("sqlite://rolodex.db?mode=rwc").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = Database::connect(database_url).await?;

    if database_url.starts_with("sqlite://") {
        configure_sqlite(&db).await?;
    }

    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Check if a database error is transient and worth retrying.
///
/// Covers SQLite lock contention and connection-pool hiccups. Constraint
/// violations and malformed statements are permanent.
pub(crate) fn is_retryable_db_error(e: &DbErr) -> bool {
    match e {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(err) | DbErr::Query(err) => {
            let msg = err.to_string().to_ascii_lowercase();
            msg.contains("locked")
                || msg.contains("busy")
                || msg.contains("timeout")
                || msg.contains("connection")
                || msg.contains("temporarily unavailable")
        }
        _ => false,
    }
}
