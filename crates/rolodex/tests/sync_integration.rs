//! Integration tests for full sync runs.
//!
//! These drive the orchestrator end to end against an in-memory SQLite
//! database and a programmable fake directory, and guard the durable
//! outcomes: run rows, checkpoints, contact rows, and the observer
//! event stream.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rolodex::connect_and_migrate;
use rolodex::remote::{DiscoveryProgress, RemoteContact, RemoteDirectory, RemoteError};
use rolodex::sync::{
    run_supervised, ProgressCallback, SyncError, SyncOptions, SyncOrchestrator, SyncProgress,
};
use rolodex::{
    CheckpointStore, PersistenceSink, ProgressUpdate, RunCounts, SyncStatus, SyncType,
};
use tokio::sync::Semaphore;

/// Maximum time any sync should take in tests. Exceeding it means a hang.
const SYNC_TIMEOUT: Duration = Duration::from_secs(20);

/// Programmable remote directory.
///
/// Ids can be told to fail their first N attempts, fail forever, or
/// hang; every successful fetch is logged for assertions.
struct FakeDirectory {
    ids: Vec<i64>,
    count: Option<u64>,
    fail_attempts: HashMap<i64, u32>,
    always_fail: HashSet<i64>,
    hang_fetches: bool,
    gate: Option<Arc<Semaphore>>,
    attempts: Mutex<HashMap<i64, u32>>,
    fetched_log: Mutex<Vec<i64>>,
}

impl FakeDirectory {
    fn new(id_count: i64) -> Self {
        Self {
            ids: (1..=id_count).collect(),
            count: None,
            fail_attempts: HashMap::new(),
            always_fail: HashSet::new(),
            hang_fetches: false,
            gate: None,
            attempts: Mutex::new(HashMap::new()),
            fetched_log: Mutex::new(Vec::new()),
        }
    }

    /// Ids that fail their first attempt and succeed afterwards.
    fn fail_once(mut self, ids: &[i64]) -> Self {
        for &id in ids {
            self.fail_attempts.insert(id, 1);
        }
        self
    }

    /// Id that fails its first `n` attempts.
    fn fail_n_times(mut self, id: i64, n: u32) -> Self {
        self.fail_attempts.insert(id, n);
        self
    }

    fn always_failing(mut self, ids: &[i64]) -> Self {
        self.always_fail.extend(ids.iter().copied());
        self
    }

    fn hanging(mut self) -> Self {
        self.hang_fetches = true;
        self
    }

    /// Fetches block until permits are added to the gate.
    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn fetched_ids(&self) -> Vec<i64> {
        self.fetched_log.lock().expect("log lock").clone()
    }

    fn contact(id: i64) -> RemoteContact {
        RemoteContact {
            external_id: id,
            full_name: format!("Contact {id}"),
            email: Some(format!("contact{id}@example.com")),
            phone: None,
            title: None,
            company: None,
            tags: vec!["synced".to_string()],
            created_at: None,
            updated_at: None,
            metadata: serde_json::json!({ "fake": true }),
        }
    }
}

#[async_trait::async_trait]
impl RemoteDirectory for FakeDirectory {
    async fn count_all(&self) -> Result<Option<u64>, RemoteError> {
        Ok(self.count)
    }

    async fn list_ids(
        &self,
        on_progress: Option<DiscoveryProgress<'_>>,
    ) -> Result<Vec<i64>, RemoteError> {
        if let Some(cb) = on_progress {
            cb(self.ids.len(), self.count);
        }
        Ok(self.ids.clone())
    }

    async fn fetch_by_id(&self, id: i64) -> Result<RemoteContact, RemoteError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| RemoteError::Cancelled)?;
        }
        if self.hang_fetches {
            std::future::pending::<()>().await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock().expect("attempts lock");
            let entry = attempts.entry(id).or_insert(0);
            *entry += 1;
            *entry
        };

        if self.always_fail.contains(&id) {
            return Err(RemoteError::connection("connection reset by peer"));
        }
        if let Some(&failures) = self.fail_attempts.get(&id) {
            if attempt <= failures {
                return Err(RemoteError::Timeout);
            }
        }

        self.fetched_log.lock().expect("log lock").push(id);
        Ok(Self::contact(id))
    }
}

/// Options tuned so a full run takes milliseconds, not minutes.
fn fast_options() -> SyncOptions {
    SyncOptions {
        per_item_timeout: Duration::from_secs(2),
        retry_pass_delay_unit: Duration::from_millis(10),
        discovery_timeout: Duration::from_secs(5),
        stall_threshold: Duration::from_secs(60),
        watchdog_interval: Duration::from_millis(50),
        ..SyncOptions::default()
    }
}

async fn setup(
    client: Arc<FakeDirectory>,
    options: SyncOptions,
) -> (SyncOrchestrator<FakeDirectory>, CheckpointStore, PersistenceSink) {
    let db = Arc::new(
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("test database should migrate"),
    );
    let store = CheckpointStore::new(Arc::clone(&db));
    let sink = PersistenceSink::new(db);
    let orchestrator = SyncOrchestrator::new(client, store.clone(), sink.clone(), options);
    (orchestrator, store, sink)
}

fn recording_callback() -> (ProgressCallback, Arc<Mutex<Vec<SyncProgress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    let cb: ProgressCallback = Box::new(move |event| {
        events_clone.lock().expect("events lock").push(event);
    });
    (cb, events)
}

#[tokio::test]
async fn full_sync_recovers_transient_failures_in_one_retry_pass() {
    let client = Arc::new(FakeDirectory::new(250).fail_once(&[10, 20, 30]));
    let (orchestrator, store, sink) = setup(Arc::clone(&client), fast_options()).await;
    let (cb, events) = recording_callback();

    let report = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(Some(&cb)))
        .await
        .expect("sync should not hang")
        .expect("sync should complete");

    assert!(report.completed);
    assert_eq!(report.fetched, 250);
    assert_eq!(report.created, 250);
    assert_eq!(report.updated, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(report.retry_passes, 1);
    assert!(report.failed_ids.is_empty());

    let run = store
        .latest_run(SyncType::ContactBulk)
        .await
        .expect("query")
        .expect("run row exists");
    assert_eq!(run.status, SyncStatus::Completed);
    assert_eq!(run.created_count, 250);
    assert_eq!(run.error_count, 0);
    // No remote count, so the discovered id list is the expected total.
    assert_eq!(run.total_expected, Some(250));
    assert!(run.completed_at.is_some());

    let recovered = sink
        .find_by_external_id(20)
        .await
        .expect("query")
        .expect("transiently failing contact should exist");
    assert_eq!(recovered.full_name, "Contact 20");

    let events = events.lock().expect("events lock");
    assert!(matches!(events.first(), Some(SyncProgress::Started { .. })));
    assert!(matches!(events.last(), Some(SyncProgress::Completed { .. })));
    let retry_passes = events
        .iter()
        .filter(|e| matches!(e, SyncProgress::RetryPass { .. }))
        .count();
    assert_eq!(retry_passes, 1);
    assert!(!events.iter().any(|e| matches!(e, SyncProgress::Error { .. })));
}

#[tokio::test]
async fn second_sync_is_rejected_while_first_runs() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(FakeDirectory::new(30).gated(Arc::clone(&gate)));
    let (orchestrator, store, _) = setup(Arc::clone(&client), fast_options()).await;
    let orchestrator = Arc::new(orchestrator);

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.start_sync(None).await })
    };

    // Wait until the first run holds the claim.
    tokio::time::timeout(SYNC_TIMEOUT, async {
        loop {
            if let Some(run) = store
                .latest_run(SyncType::ContactBulk)
                .await
                .expect("query")
            {
                if run.status == SyncStatus::Running {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first run should claim");

    let err = orchestrator
        .start_sync(None)
        .await
        .expect_err("second concurrent sync must be rejected");
    assert!(matches!(err, SyncError::AlreadyRunning { .. }));

    gate.add_permits(10_000);
    let report = tokio::time::timeout(SYNC_TIMEOUT, first)
        .await
        .expect("first run should finish")
        .expect("task should not panic")
        .expect("first run should complete");
    assert!(report.completed);

    // Exactly one run row: the rejected attempt left no trace.
    let history = store
        .run_history(SyncType::ContactBulk, rolodex::Pagination::new(0, 50))
        .await
        .expect("history");
    assert_eq!(history.total, 1);
}

#[tokio::test]
async fn resume_skips_already_processed_ids() {
    let client = Arc::new(FakeDirectory::new(250));
    let (orchestrator, store, _) = setup(Arc::clone(&client), fast_options()).await;

    // A previous run that checkpointed through id 100 and then died.
    let crashed = store
        .claim_run(SyncType::ContactBulk)
        .await
        .expect("claim");
    store
        .update_progress(
            crashed.id,
            ProgressUpdate {
                fetched_count: Some(100),
                created_count: Some(100),
                last_processed_id: Some(100),
                ..Default::default()
            },
        )
        .await
        .expect("checkpoint");
    store
        .finalize(
            crashed.id,
            SyncStatus::Failed,
            RunCounts {
                fetched: 100,
                created: 100,
                ..Default::default()
            },
            Some("process killed".to_string()),
        )
        .await
        .expect("finalize");

    let (cb, events) = recording_callback();
    let report = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(Some(&cb)))
        .await
        .expect("sync should not hang")
        .expect("resumed sync should complete");

    assert!(report.completed);
    assert_eq!(report.fetched, 150);

    let fetched = client.fetched_ids();
    assert_eq!(fetched.len(), 150);
    assert!(fetched.iter().all(|&id| id > 100), "refetched an already processed id");

    let events = events.lock().expect("events lock");
    assert!(events.iter().any(|e| matches!(
        e,
        SyncProgress::Resuming {
            resume_id: 100,
            resume_index: 99,
        }
    )));
}

#[tokio::test]
async fn missing_resume_point_restarts_from_the_beginning() {
    let client = Arc::new(FakeDirectory::new(40));
    let (orchestrator, store, _) = setup(Arc::clone(&client), fast_options()).await;

    let crashed = store
        .claim_run(SyncType::ContactBulk)
        .await
        .expect("claim");
    store
        .update_progress(
            crashed.id,
            ProgressUpdate {
                last_processed_id: Some(99_999),
                ..Default::default()
            },
        )
        .await
        .expect("checkpoint");
    store
        .finalize(
            crashed.id,
            SyncStatus::Failed,
            RunCounts::default(),
            Some("interrupted".to_string()),
        )
        .await
        .expect("finalize");

    let (cb, events) = recording_callback();
    let report = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(Some(&cb)))
        .await
        .expect("sync should not hang")
        .expect("sync should complete");

    assert!(report.completed);
    assert_eq!(report.fetched, 40);
    assert_eq!(client.fetched_ids().len(), 40);

    let events = events.lock().expect("events lock");
    assert!(events.iter().any(|e| matches!(
        e,
        SyncProgress::ResumePointMissing { resume_id: 99_999 }
    )));
}

#[tokio::test]
async fn watchdog_aborts_a_hung_run() {
    let client = Arc::new(FakeDirectory::new(50).hanging());
    let options = SyncOptions {
        per_item_timeout: Duration::from_secs(120),
        stall_threshold: Duration::from_millis(100),
        watchdog_interval: Duration::from_millis(25),
        ..fast_options()
    };
    let (orchestrator, store, _) = setup(Arc::clone(&client), options).await;
    let (cb, events) = recording_callback();

    let err = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(Some(&cb)))
        .await
        .expect("stalled sync must be aborted promptly")
        .expect_err("stalled sync must fail");

    match err {
        SyncError::Aborted { message } => {
            assert!(message.contains("stalled"), "message: {message}")
        }
        other => panic!("unexpected error: {other}"),
    }

    let run = store
        .latest_run(SyncType::ContactBulk)
        .await
        .expect("query")
        .expect("run row exists");
    assert_eq!(run.status, SyncStatus::Failed);
    let message = run.error_message.expect("stall message");
    assert!(message.contains("streaming"), "message: {message}");

    let events = events.lock().expect("events lock");
    let errors = events
        .iter()
        .filter(|e| matches!(e, SyncProgress::Error { .. }))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn incomplete_coverage_fails_the_run_without_exceptions() {
    let client = Arc::new(FakeDirectory::new(50).always_failing(&[42]));
    let options = SyncOptions {
        max_retry_passes: 2,
        ..fast_options()
    };
    let (orchestrator, store, _) = setup(Arc::clone(&client), options).await;

    let err = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(None))
        .await
        .expect("sync should not hang")
        .expect_err("shortfall must fail the run");

    match err {
        SyncError::Incomplete { covered, expected } => {
            assert_eq!(covered, 49);
            assert_eq!(expected, 50);
        }
        other => panic!("unexpected error: {other}"),
    }

    let run = store
        .latest_run(SyncType::ContactBulk)
        .await
        .expect("query")
        .expect("run row exists");
    assert_eq!(run.status, SyncStatus::Failed);
    assert_eq!(run.fetched_count, 49);
    assert_eq!(run.created_count, 49);
    // The never-fetched id lives in the message, not in error_count.
    assert_eq!(run.error_count, 0);
    assert!(
        run.created_count + run.updated_count + run.error_count <= run.fetched_count,
        "terminal counters out of balance: {run:?}"
    );
    let message = run.error_message.expect("failure message");
    assert!(message.contains("42"), "message: {message}");
    assert!(message.contains("1 ids still failing"), "message: {message}");
}

#[tokio::test]
async fn failed_set_shrinks_monotonically_across_passes() {
    let client = Arc::new(
        FakeDirectory::new(60)
            .fail_n_times(5, 2)
            .fail_n_times(6, 2)
            .fail_n_times(7, 1),
    );
    let (orchestrator, _, _) = setup(Arc::clone(&client), fast_options()).await;
    let (cb, events) = recording_callback();

    let report = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(Some(&cb)))
        .await
        .expect("sync should not hang")
        .expect("sync should complete");

    assert!(report.completed);
    assert_eq!(report.retry_passes, 2);

    let events = events.lock().expect("events lock");
    let remaining_per_pass: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SyncProgress::RetryPass { remaining, .. } => Some(*remaining),
            _ => None,
        })
        .collect();
    assert_eq!(remaining_per_pass, vec![3, 2]);
}

#[tokio::test]
async fn supervisor_fails_the_run_when_the_sync_task_panics() {
    struct PanickingDirectory;

    #[async_trait::async_trait]
    impl RemoteDirectory for PanickingDirectory {
        async fn count_all(&self) -> Result<Option<u64>, RemoteError> {
            Ok(Some(10))
        }

        async fn list_ids(
            &self,
            _on_progress: Option<DiscoveryProgress<'_>>,
        ) -> Result<Vec<i64>, RemoteError> {
            panic!("directory invariant violated");
        }

        async fn fetch_by_id(&self, _id: i64) -> Result<RemoteContact, RemoteError> {
            unreachable!()
        }
    }

    let db = Arc::new(
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("test database should migrate"),
    );
    let store = CheckpointStore::new(Arc::clone(&db));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(PanickingDirectory),
        store.clone(),
        PersistenceSink::new(db),
        fast_options(),
    ));

    let err = tokio::time::timeout(SYNC_TIMEOUT, run_supervised(orchestrator, None))
        .await
        .expect("supervised sync should return")
        .expect_err("panicked sync must fail");

    match err {
        SyncError::Panicked { message } => {
            assert!(message.contains("directory invariant violated"), "message: {message}")
        }
        other => panic!("unexpected error: {other}"),
    }

    let run = store
        .latest_run(SyncType::ContactBulk)
        .await
        .expect("query")
        .expect("run row exists");
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(run
        .error_message
        .expect("message")
        .contains("panicked"));
}

#[tokio::test]
async fn cancel_sync_fails_the_running_row() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(FakeDirectory::new(30).gated(Arc::clone(&gate)));
    let (orchestrator, store, _) = setup(Arc::clone(&client), fast_options()).await;
    let orchestrator = Arc::new(orchestrator);

    let run_task = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.start_sync(None).await })
    };

    tokio::time::timeout(SYNC_TIMEOUT, async {
        loop {
            if let Some(run) = store
                .latest_run(SyncType::ContactBulk)
                .await
                .expect("query")
            {
                if run.status == SyncStatus::Running {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run should claim");

    // The run may finalize its own row before `mark_running_failed` sees
    // it, so the returned id is not asserted.
    orchestrator.cancel_sync().await.expect("cancel");

    let result = tokio::time::timeout(SYNC_TIMEOUT, run_task)
        .await
        .expect("cancelled run should return promptly")
        .expect("task should not panic");
    assert!(matches!(result, Err(SyncError::Aborted { .. })));

    let run = store
        .latest_run(SyncType::ContactBulk)
        .await
        .expect("query")
        .expect("run row exists");
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(run
        .error_message
        .expect("message")
        .contains("cancelled"));
}

#[tokio::test]
async fn completion_checkpoint_failure_surfaces_one_error_event() {
    use sea_orm::{ConnectionTrait, Statement};

    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(FakeDirectory::new(10).gated(Arc::clone(&gate)));
    let db = Arc::new(
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("test database should migrate"),
    );
    let store = CheckpointStore::new(Arc::clone(&db));
    let orchestrator = SyncOrchestrator::new(
        client,
        store.clone(),
        PersistenceSink::new(Arc::clone(&db)),
        fast_options(),
    );
    let (cb, events) = recording_callback();

    // Once the run holds its claim, pull the run table out from under it
    // so the terminal completed write cannot succeed.
    let saboteur = {
        let db = Arc::clone(&db);
        let store = store.clone();
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            loop {
                if let Some(run) = store
                    .latest_run(SyncType::ContactBulk)
                    .await
                    .expect("query")
                {
                    if run.status == SyncStatus::Running {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            db.execute(Statement::from_string(
                db.get_database_backend(),
                "DROP TABLE sync_runs".to_string(),
            ))
            .await
            .expect("drop table");
            gate.add_permits(10_000);
        })
    };

    let err = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(Some(&cb)))
        .await
        .expect("sync should not hang")
        .expect_err("lost run table must fail the run");
    assert!(matches!(err, SyncError::Checkpoint(_)), "unexpected error: {err}");
    saboteur.await.expect("saboteur task");

    let events = events.lock().expect("events lock");
    assert!(!events
        .iter()
        .any(|e| matches!(e, SyncProgress::Completed { .. })));
    let errors = events
        .iter()
        .filter(|e| matches!(e, SyncProgress::Error { .. }))
        .count();
    assert_eq!(errors, 1);
}

/// Idempotency across whole runs: a second full sync updates rows
/// instead of duplicating them.
#[tokio::test]
async fn rerun_updates_rather_than_duplicates() {
    let client = Arc::new(FakeDirectory::new(25));
    let (orchestrator, _, sink) = setup(Arc::clone(&client), fast_options()).await;

    let first = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(None))
        .await
        .expect("no hang")
        .expect("first run completes");
    assert_eq!(first.created, 25);
    assert_eq!(first.updated, 0);

    let second = tokio::time::timeout(SYNC_TIMEOUT, orchestrator.start_sync(None))
        .await
        .expect("no hang")
        .expect("second run completes");
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 25);

    let row = sink
        .find_by_external_id(13)
        .await
        .expect("query")
        .expect("row exists");
    assert_eq!(row.external_id, 13);
}
