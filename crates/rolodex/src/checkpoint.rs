//! Durable checkpoint store for sync runs.
//!
//! Every piece of run state the engine needs to survive a crash lives in
//! the `sync_runs` table and goes through [`CheckpointStore`]. The store
//! is deliberately dumb: it claims, patches, and finalizes rows, and
//! answers resume and history queries. Deciding what to write is the
//! orchestrator's job.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use thiserror::Error;
use uuid::Uuid;

use crate::db::is_retryable_db_error;
use crate::entity::sync_run::{ActiveModel, Column, Entity as SyncRun, Model};
use crate::entity::{sync_phase::SyncPhase, sync_status::SyncStatus, sync_type::SyncType};

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Another run of this type is already in progress.
    #[error("A {sync_type} sync is already running (run {run_id})")]
    AlreadyRunning { sync_type: SyncType, run_id: Uuid },

    /// Referenced run row does not exist.
    #[error("Sync run not found: {run_id}")]
    RunNotFound { run_id: Uuid },
}

/// Result type alias for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Partial update applied to a running row.
///
/// Only `Some` fields are written, so callers checkpoint exactly what
/// changed. Counter fields are absolute values, not deltas.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub phase: Option<SyncPhase>,
    pub total_expected: Option<i64>,
    pub fetched_count: Option<i64>,
    pub created_count: Option<i64>,
    pub updated_count: Option<i64>,
    pub error_count: Option<i64>,
    pub last_processed_id: Option<i64>,
    pub error_message: Option<String>,
}

/// Where a previous run stopped.
#[derive(Debug, Clone)]
pub struct ResumePoint {
    /// The interrupted run.
    pub run_id: Uuid,
    /// External id of the last durably persisted record.
    pub last_processed_id: i64,
    /// How many records the interrupted run had fetched.
    pub fetched_count: i64,
}

/// Pagination parameters for history queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    /// Page number (0-indexed).
    pub page: u64,
    /// Items per page.
    pub per_page: u64,
}

const MIN_PER_PAGE: u64 = 1;

impl Pagination {
    /// Create a new pagination with the given page and per_page values.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page,
            per_page: per_page.max(MIN_PER_PAGE),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: MIN_PER_PAGE,
        }
    }
}

/// Result of a paginated history query.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    /// The items for the current page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// Current page number (0-indexed).
    pub page: u64,
    /// Items per page.
    pub per_page: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

/// Number of attempts for the terminal checkpoint write.
const FINALIZE_ATTEMPTS: u32 = 3;
/// Initial backoff in milliseconds between finalize attempts (doubles each retry).
const FINALIZE_BACKOFF_MS: u64 = 100;

/// Checkpoint store over the `sync_runs` table.
///
/// Holds a shared connection handle, so clones are cheap and every
/// clone writes through the same pool.
#[derive(Clone)]
pub struct CheckpointStore {
    db: Arc<DatabaseConnection>,
}

impl CheckpointStore {
    pub fn new(db: impl Into<Arc<DatabaseConnection>>) -> Self {
        Self { db: db.into() }
    }

    /// Atomically claim the right to run a sync of the given type.
    ///
    /// Checks for an existing `running` row and inserts the new one inside
    /// a single transaction, so two concurrent claims cannot both succeed.
    /// The loser gets [`CheckpointError::AlreadyRunning`] and no row is
    /// created for it.
    pub async fn claim_run(&self, sync_type: SyncType) -> Result<Model> {
        let txn = self.db.begin().await?;

        let existing = SyncRun::find()
            .filter(Column::SyncType.eq(sync_type))
            .filter(Column::Status.eq(SyncStatus::Running))
            .one(&txn)
            .await?;

        if let Some(running) = existing {
            // Dropping the transaction rolls it back.
            return Err(CheckpointError::AlreadyRunning {
                sync_type,
                run_id: running.id,
            });
        }

        let run = ActiveModel {
            id: Set(Uuid::new_v4()),
            sync_type: Set(sync_type),
            status: Set(SyncStatus::Running),
            phase: Set(SyncPhase::Claiming),
            started_at: Set(Utc::now().fixed_offset()),
            completed_at: Set(None),
            total_expected: Set(None),
            fetched_count: Set(0),
            created_count: Set(0),
            updated_count: Set(0),
            error_count: Set(0),
            last_processed_id: Set(None),
            error_message: Set(None),
        };

        let model = run.insert(&txn).await?;
        txn.commit().await?;

        tracing::info!(run_id = %model.id, sync_type = %sync_type, "Claimed sync run");
        Ok(model)
    }

    /// Apply a partial progress update to a run row.
    ///
    /// Mid-run checkpoint loss degrades resume granularity but must not
    /// kill a healthy run, so most callers log the error and continue
    /// rather than propagating it.
    pub async fn update_progress(&self, run_id: Uuid, update: ProgressUpdate) -> Result<()> {
        let mut row = ActiveModel {
            id: Set(run_id),
            ..Default::default()
        };

        if let Some(phase) = update.phase {
            row.phase = Set(phase);
        }
        if let Some(total) = update.total_expected {
            row.total_expected = Set(Some(total));
        }
        if let Some(fetched) = update.fetched_count {
            row.fetched_count = Set(fetched);
        }
        if let Some(created) = update.created_count {
            row.created_count = Set(created);
        }
        if let Some(updated) = update.updated_count {
            row.updated_count = Set(updated);
        }
        if let Some(errors) = update.error_count {
            row.error_count = Set(errors);
        }
        if let Some(last_id) = update.last_processed_id {
            row.last_processed_id = Set(Some(last_id));
        }
        if let Some(message) = update.error_message {
            row.error_message = Set(Some(message));
        }

        // An empty patch degenerates to a find, which reports the missing
        // row as RecordNotFound instead of RecordNotUpdated.
        match row.update(self.db.as_ref()).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated | DbErr::RecordNotFound(_)) => {
                Err(CheckpointError::RunNotFound { run_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find where the most recent interrupted run stopped.
    ///
    /// Considers `running` rows (a killed process leaves one behind) as
    /// well as `failed` ones, but only runs that wrote at least one
    /// checkpoint. Completed runs are never resumed.
    pub async fn find_resume_point(&self, sync_type: SyncType) -> Result<Option<ResumePoint>> {
        let candidate = SyncRun::find()
            .filter(Column::SyncType.eq(sync_type))
            .filter(
                Column::Status
                    .eq(SyncStatus::Running)
                    .or(Column::Status.eq(SyncStatus::Failed)),
            )
            .filter(Column::LastProcessedId.is_not_null())
            .order_by_desc(Column::StartedAt)
            .one(self.db.as_ref())
            .await?;

        Ok(candidate.and_then(|run| {
            run.last_processed_id.map(|last_processed_id| ResumePoint {
                run_id: run.id,
                last_processed_id,
                fetched_count: run.fetched_count,
            })
        }))
    }

    /// Write the terminal checkpoint for a run.
    ///
    /// This is the one write the engine insists on making durable: it is
    /// retried with exponential backoff on transient database errors
    /// before the failure is surfaced.
    pub async fn finalize(
        &self,
        run_id: Uuid,
        status: SyncStatus,
        counts: RunCounts,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut backoff_ms = FINALIZE_BACKOFF_MS;
        let mut last_error: Option<CheckpointError> = None;

        for attempt in 0..FINALIZE_ATTEMPTS {
            let row = ActiveModel {
                id: Set(run_id),
                status: Set(status),
                phase: Set(SyncPhase::Done),
                completed_at: Set(Some(Utc::now().fixed_offset())),
                fetched_count: Set(counts.fetched),
                created_count: Set(counts.created),
                updated_count: Set(counts.updated),
                error_count: Set(counts.errors),
                error_message: Set(error_message.clone()),
                ..Default::default()
            };

            match row.update(self.db.as_ref()).await {
                Ok(_) => {
                    tracing::info!(run_id = %run_id, status = %status, "Finalized sync run");
                    return Ok(());
                }
                Err(DbErr::RecordNotUpdated | DbErr::RecordNotFound(_)) => {
                    return Err(CheckpointError::RunNotFound { run_id });
                }
                Err(e) if is_retryable_db_error(&e) && attempt + 1 < FINALIZE_ATTEMPTS => {
                    tracing::warn!(
                        run_id = %run_id,
                        attempt = attempt + 1,
                        backoff_ms = backoff_ms,
                        error = %e,
                        "Finalize failed, retrying"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    last_error = Some(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error.unwrap_or(CheckpointError::RunNotFound { run_id }))
    }

    /// Mark a specific run as failed, leaving counters and the resume
    /// point untouched.
    ///
    /// Used by the watchdog, which knows the run id but not the
    /// orchestrator's in-memory counters.
    pub async fn fail_run(&self, run_id: Uuid, message: &str) -> Result<()> {
        let row = ActiveModel {
            id: Set(run_id),
            status: Set(SyncStatus::Failed),
            completed_at: Set(Some(Utc::now().fixed_offset())),
            error_message: Set(Some(message.to_string())),
            ..Default::default()
        };

        match row.update(self.db.as_ref()).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated | DbErr::RecordNotFound(_)) => {
                Err(CheckpointError::RunNotFound { run_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark the currently running run of a type as failed.
    ///
    /// Used by cancellation and by the supervisor safety net. Returns the
    /// id of the row that was failed, or `None` when nothing was running.
    pub async fn mark_running_failed(
        &self,
        sync_type: SyncType,
        message: &str,
    ) -> Result<Option<Uuid>> {
        let running = SyncRun::find()
            .filter(Column::SyncType.eq(sync_type))
            .filter(Column::Status.eq(SyncStatus::Running))
            .one(self.db.as_ref())
            .await?;

        let Some(run) = running else {
            return Ok(None);
        };

        let row = ActiveModel {
            id: Set(run.id),
            status: Set(SyncStatus::Failed),
            completed_at: Set(Some(Utc::now().fixed_offset())),
            error_message: Set(Some(message.to_string())),
            ..Default::default()
        };
        row.update(self.db.as_ref()).await?;

        tracing::warn!(run_id = %run.id, message = message, "Marked running sync as failed");
        Ok(Some(run.id))
    }

    /// Look up a run by id.
    pub async fn find_run(&self, run_id: Uuid) -> Result<Option<Model>> {
        SyncRun::find_by_id(run_id)
            .one(self.db.as_ref())
            .await
            .map_err(CheckpointError::from)
    }

    /// The most recent run of a type, regardless of status.
    pub async fn latest_run(&self, sync_type: SyncType) -> Result<Option<Model>> {
        SyncRun::find()
            .filter(Column::SyncType.eq(sync_type))
            .order_by_desc(Column::StartedAt)
            .one(self.db.as_ref())
            .await
            .map_err(CheckpointError::from)
    }

    /// Run history for a type, newest first.
    pub async fn run_history(
        &self,
        sync_type: SyncType,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Model>> {
        let paginator = SyncRun::find()
            .filter(Column::SyncType.eq(sync_type))
            .order_by_desc(Column::StartedAt)
            .paginate(self.db.as_ref(), pagination.per_page);

        let total = paginator.num_items().await?;
        let total_pages = paginator.num_pages().await?;
        let items = paginator.fetch_page(pagination.page).await?;

        Ok(PaginatedResult {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages,
        })
    }
}

/// Final counter snapshot written by `finalize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounts {
    pub fetched: i64,
    pub created: i64,
    pub updated: i64,
    pub errors: i64,
}


#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use super::*;
    use crate::connect_and_migrate;

    async fn store() -> CheckpointStore {
        let db = connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate");
        CheckpointStore::new(db)
    }

    #[tokio::test]
    async fn claim_rejects_second_concurrent_run() {
        let store = store().await;
        let first = store
            .claim_run(SyncType::ContactBulk)
            .await
            .expect("first claim should succeed");

        let err = store
            .claim_run(SyncType::ContactBulk)
            .await
            .expect_err("second claim should fail");
        match err {
            CheckpointError::AlreadyRunning { run_id, .. } => assert_eq!(run_id, first.id),
            other => panic!("unexpected error: {other}"),
        }

        store
            .finalize(
                first.id,
                SyncStatus::Completed,
                RunCounts::default(),
                None,
            )
            .await
            .expect("finalize should succeed");

        store
            .claim_run(SyncType::ContactBulk)
            .await
            .expect("claim after finalize should succeed");
    }

    #[tokio::test]
    async fn update_progress_patches_only_given_fields() {
        let store = store().await;
        let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");

        store
            .update_progress(
                run.id,
                ProgressUpdate {
                    phase: Some(SyncPhase::Streaming),
                    total_expected: Some(500),
                    fetched_count: Some(120),
                    last_processed_id: Some(9876),
                    ..Default::default()
                },
            )
            .await
            .expect("update should succeed");

        let latest = store
            .latest_run(SyncType::ContactBulk)
            .await
            .expect("latest_run")
            .expect("row exists");
        assert_eq!(latest.phase, SyncPhase::Streaming);
        assert_eq!(latest.total_expected, Some(500));
        assert_eq!(latest.fetched_count, 120);
        assert_eq!(latest.last_processed_id, Some(9876));
        assert_eq!(latest.status, SyncStatus::Running);
        assert_eq!(latest.created_count, 0);
    }

    #[tokio::test]
    async fn update_progress_unknown_run_errors() {
        let store = store().await;
        let err = store
            .update_progress(Uuid::new_v4(), ProgressUpdate::default())
            .await
            .expect_err("unknown run should error");
        assert!(matches!(err, CheckpointError::RunNotFound { .. }));
    }

    #[tokio::test]
    async fn fail_run_unknown_run_errors() {
        let store = store().await;
        let err = store
            .fail_run(Uuid::new_v4(), "stalled")
            .await
            .expect_err("unknown run should error");
        assert!(matches!(err, CheckpointError::RunNotFound { .. }));
    }

    #[tokio::test]
    async fn cloned_stores_share_the_connection() {
        let store = store().await;
        let other = store.clone();

        let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");
        let seen = other
            .latest_run(SyncType::ContactBulk)
            .await
            .expect("query")
            .expect("clone sees the claimed row");
        assert_eq!(seen.id, run.id);
    }

    #[tokio::test]
    async fn resume_point_skips_runs_without_checkpoints() {
        let store = store().await;

        let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");
        store
            .finalize(
                run.id,
                SyncStatus::Failed,
                RunCounts::default(),
                Some("died before first checkpoint".to_string()),
            )
            .await
            .expect("finalize");

        assert!(store
            .find_resume_point(SyncType::ContactBulk)
            .await
            .expect("query")
            .is_none());

        let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");
        store
            .update_progress(
                run.id,
                ProgressUpdate {
                    fetched_count: Some(40),
                    last_processed_id: Some(777),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        store
            .finalize(
                run.id,
                SyncStatus::Failed,
                RunCounts {
                    fetched: 40,
                    created: 40,
                    ..Default::default()
                },
                Some("interrupted".to_string()),
            )
            .await
            .expect("finalize");

        let resume = store
            .find_resume_point(SyncType::ContactBulk)
            .await
            .expect("query")
            .expect("resume point should exist");
        assert_eq!(resume.run_id, run.id);
        assert_eq!(resume.last_processed_id, 777);
        assert_eq!(resume.fetched_count, 40);
    }

    #[tokio::test]
    async fn completed_runs_are_never_resume_candidates() {
        let store = store().await;
        let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");
        store
            .update_progress(
                run.id,
                ProgressUpdate {
                    last_processed_id: Some(123),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        store
            .finalize(run.id, SyncStatus::Completed, RunCounts::default(), None)
            .await
            .expect("finalize");

        assert!(store
            .find_resume_point(SyncType::ContactBulk)
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn mark_running_failed_targets_only_the_running_row() {
        let store = store().await;
        assert!(store
            .mark_running_failed(SyncType::ContactBulk, "nothing running")
            .await
            .expect("query")
            .is_none());

        let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");
        let failed = store
            .mark_running_failed(SyncType::ContactBulk, "cancelled by operator")
            .await
            .expect("mark failed");
        assert_eq!(failed, Some(run.id));

        let latest = store
            .latest_run(SyncType::ContactBulk)
            .await
            .expect("latest")
            .expect("row exists");
        assert_eq!(latest.status, SyncStatus::Failed);
        assert!(latest.completed_at.is_some());
        assert_eq!(
            latest.error_message.as_deref(),
            Some("cancelled by operator")
        );
    }

    #[tokio::test]
    async fn run_history_pages_newest_first() {
        let store = store().await;
        for i in 0..3 {
            let run = store.claim_run(SyncType::ContactBulk).await.expect("claim");
            store
                .finalize(
                    run.id,
                    SyncStatus::Completed,
                    RunCounts {
                        fetched: i,
                        ..Default::default()
                    },
                    None,
                )
                .await
                .expect("finalize");
        }

        let page = store
            .run_history(SyncType::ContactBulk, Pagination::new(0, 2))
            .await
            .expect("history");
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 2);
    }
}
