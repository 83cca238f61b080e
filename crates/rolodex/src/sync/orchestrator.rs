//! The sync run state machine.
//!
//! One `start_sync` call drives a full run: claim, discover, stream,
//! retry, finalize. Collaborators are injected so tests can swap the
//! remote client and point the store and sink at an in-memory database.
//!
//! Failure discipline: once a run row exists, every exit path finalizes
//! it. `start_sync` returns `Err` for failed runs, but the durable
//! outcome is already in `sync_runs` by then, and observers have seen
//! exactly one terminal `Completed` or `Error` event.

use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checkpoint::{CheckpointError, CheckpointStore, ProgressUpdate, RunCounts};
use crate::entity::{sync_phase::SyncPhase, sync_status::SyncStatus, sync_type::SyncType};
use crate::persist::PersistenceSink;
use crate::remote::{RemoteContact, RemoteDirectory, RemoteError};

use super::errors::{Result, SyncError};
use super::fetcher::fetch_batch;
use super::progress::{emit, ProgressCallback, SyncProgress};
use super::retry::plan_passes;
use super::types::{SyncOptions, SyncReport};
use super::watchdog::{spawn_watchdog, ActivityTracker};

/// How many still-failing ids a terminal message names before eliding.
const FAILED_ID_SAMPLE: usize = 20;

/// Orchestrates bulk contact sync runs.
pub struct SyncOrchestrator<C: RemoteDirectory + ?Sized> {
    client: Arc<C>,
    store: CheckpointStore,
    sink: PersistenceSink,
    options: SyncOptions,
    shutdown: CancellationToken,
}

/// Mutable run state threaded through the phases.
struct RunState {
    run_id: Uuid,
    total_expected: i64,
    /// Fetched count carried over from the run being resumed.
    prior_fetched: i64,
    fetched: i64,
    created: i64,
    updated: i64,
    persist_errors: i64,
    buffer: Vec<RemoteContact>,
    failed_ids: Vec<i64>,
    retry_passes: u32,
    last_window_id: Option<i64>,
}

impl RunState {
    /// Counter snapshot for the terminal checkpoint.
    ///
    /// `errors` counts persistence failures only. Ids that were never
    /// fetched are not in `fetched`, so folding them in here would break
    /// `created + updated + errors <= fetched`; they are reported through
    /// the terminal message and the report's failed-id sample instead.
    fn counts(&self) -> RunCounts {
        RunCounts {
            fetched: self.fetched,
            created: self.created,
            updated: self.updated,
            errors: self.persist_errors,
        }
    }

    fn processed(&self) -> usize {
        (self.fetched as usize) + self.failed_ids.len()
    }
}

impl<C: RemoteDirectory + ?Sized + 'static> SyncOrchestrator<C> {
    pub fn new(
        client: Arc<C>,
        store: CheckpointStore,
        sink: PersistenceSink,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            store,
            sink,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token (e.g. wired to SIGINT).
    #[must_use]
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// The checkpoint store this orchestrator writes through.
    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Request cancellation of the in-process run and fail its row.
    ///
    /// Returns the id of the row that was failed, if one was running.
    pub async fn cancel_sync(&self) -> Result<Option<Uuid>> {
        self.shutdown.cancel();
        let failed = self
            .store
            .mark_running_failed(SyncType::ContactBulk, "Sync cancelled by operator")
            .await?;
        Ok(failed)
    }

    /// Run one full bulk sync.
    ///
    /// Returns `Err(SyncError::AlreadyRunning)` without side effects when
    /// another run holds the claim. Any later failure finalizes the run
    /// row as failed before the error is returned.
    pub async fn start_sync(&self, on_progress: Option<&ProgressCallback>) -> Result<SyncReport> {
        let run = match self.store.claim_run(SyncType::ContactBulk).await {
            Ok(run) => run,
            Err(CheckpointError::AlreadyRunning { run_id, .. }) => {
                return Err(SyncError::AlreadyRunning { run_id });
            }
            Err(e) => return Err(e.into()),
        };

        let token = self.shutdown.child_token();
        let tracker = ActivityTracker::new();
        let watchdog = spawn_watchdog(
            tracker.clone(),
            self.store.clone(),
            run.id,
            self.options.watchdog_interval,
            self.options.stall_threshold,
            token.clone(),
        );

        let result = self.run(run.id, &tracker, &token, on_progress).await;
        drop(watchdog);
        result
    }

    async fn run(
        &self,
        run_id: Uuid,
        tracker: &ActivityTracker,
        token: &CancellationToken,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SyncReport> {
        let mut state = RunState {
            run_id,
            total_expected: 0,
            prior_fetched: 0,
            fetched: 0,
            created: 0,
            updated: 0,
            persist_errors: 0,
            buffer: Vec::new(),
            failed_ids: Vec::new(),
            retry_passes: 0,
            last_window_id: None,
        };

        // ── Discover ────────────────────────────────────────────────
        tracker.enter_phase(SyncPhase::Discovering);
        self.checkpoint(
            run_id,
            ProgressUpdate {
                phase: Some(SyncPhase::Discovering),
                ..Default::default()
            },
        )
        .await;

        let remote_total = match self.client.count_all().await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(error = %e, "Remote count unavailable, will fall back to id list length");
                None
            }
        };
        emit(on_progress, SyncProgress::Started { total: remote_total });
        emit(on_progress, SyncProgress::DiscoveringIds);

        let ids = tokio::select! {
            _ = token.cancelled() => {
                return Err(self.abort(&state, on_progress).await);
            }
            result = self.discover_ids(tracker, remote_total, on_progress) => match result {
                Ok(ids) => ids,
                Err(e) => {
                    let message = format!("Id discovery failed: {e}");
                    self.finalize_failed(&state, &message, on_progress).await;
                    return Err(SyncError::Discovery {
                        message: e.to_string(),
                    });
                }
            },
        };

        emit(on_progress, SyncProgress::DiscoveryComplete { total: ids.len() });
        tracker.bump();

        // The fallback total is the discovered id list, never the local
        // row count: a stale local table must not mask missing records.
        state.total_expected = remote_total.unwrap_or(ids.len() as u64) as i64;
        self.checkpoint(
            run_id,
            ProgressUpdate {
                total_expected: Some(state.total_expected),
                ..Default::default()
            },
        )
        .await;

        // ── Resume ──────────────────────────────────────────────────
        let start_index = match self.store.find_resume_point(SyncType::ContactBulk).await {
            Ok(Some(resume)) => match ids.iter().position(|&id| id == resume.last_processed_id) {
                Some(index) => {
                    emit(
                        on_progress,
                        SyncProgress::Resuming {
                            resume_id: resume.last_processed_id,
                            resume_index: index,
                        },
                    );
                    tracing::info!(
                        resume_id = resume.last_processed_id,
                        resume_index = index,
                        prior_fetched = resume.fetched_count,
                        "Resuming from previous run"
                    );
                    state.prior_fetched = resume.fetched_count;
                    index + 1
                }
                None => {
                    emit(
                        on_progress,
                        SyncProgress::ResumePointMissing {
                            resume_id: resume.last_processed_id,
                        },
                    );
                    tracing::warn!(
                        resume_id = resume.last_processed_id,
                        "Checkpoint id no longer present remotely, starting from the beginning"
                    );
                    0
                }
            },
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "Resume point lookup failed, starting from the beginning");
                0
            }
        };

        // ── Stream ──────────────────────────────────────────────────
        tracker.enter_phase(SyncPhase::Streaming);
        self.checkpoint(
            run_id,
            ProgressUpdate {
                phase: Some(SyncPhase::Streaming),
                ..Default::default()
            },
        )
        .await;

        let expected_hint = Some(state.total_expected as u64);
        for window in ids[start_index..].chunks(self.options.fetch_concurrency.max(1)) {
            // Dropping the fetch future aborts its in-flight tasks, so a
            // watchdog or operator cancel takes effect mid-window.
            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    return Err(self.abort(&state, on_progress).await);
                }
                outcome = fetch_batch(
                    &self.client,
                    window,
                    self.options.fetch_concurrency,
                    self.options.per_item_timeout,
                ) => outcome,
            };

            state.fetched += outcome.succeeded.len() as i64;
            state.buffer.extend(outcome.succeeded);
            state.failed_ids.extend(outcome.failed_ids);
            state.last_window_id = window.last().copied();
            tracker.bump();

            emit(
                on_progress,
                SyncProgress::BatchComplete {
                    batch_size: window.len(),
                    total_processed: state.processed(),
                    total: expected_hint,
                },
            );

            if state.buffer.len() >= self.options.flush_threshold {
                self.flush(&mut state, true, tracker, on_progress).await;
            }
        }
        if !state.buffer.is_empty() {
            self.flush(&mut state, true, tracker, on_progress).await;
        }

        // ── Retry ───────────────────────────────────────────────────
        if !state.failed_ids.is_empty() {
            tracker.enter_phase(SyncPhase::Retrying);
            self.checkpoint(
                run_id,
                ProgressUpdate {
                    phase: Some(SyncPhase::Retrying),
                    ..Default::default()
                },
            )
            .await;

            if let Err(abort) = self
                .retry_failed_ids(&mut state, tracker, token, on_progress)
                .await
            {
                return Err(abort);
            }
        }

        // ── Finalize ────────────────────────────────────────────────
        tracker.enter_phase(SyncPhase::Finalizing);
        let remaining = state.failed_ids.len() as i64;
        let covered = state.prior_fetched + state.fetched;

        if covered >= state.total_expected && remaining == 0 && state.persist_errors == 0 {
            if let Err(e) = self
                .store
                .finalize(run_id, SyncStatus::Completed, state.counts(), None)
                .await
            {
                // Even this exit owes the observer its single terminal event.
                tracing::error!(run_id = %run_id, error = %e, "Completion checkpoint failed");
                emit(
                    on_progress,
                    SyncProgress::Error {
                        message: format!("Completion checkpoint failed: {e}"),
                    },
                );
                return Err(e.into());
            }
            emit(
                on_progress,
                SyncProgress::Completed {
                    fetched: state.fetched,
                    created: state.created,
                    updated: state.updated,
                    retry_passes: state.retry_passes,
                },
            );
            Ok(self.report(&state, true))
        } else {
            let message = incomplete_message(covered, state.total_expected, &state.failed_ids);
            self.finalize_failed(&state, &message, on_progress).await;
            Err(SyncError::Incomplete {
                covered,
                expected: state.total_expected,
            })
        }
    }

    /// Enumerate remote ids, retrying the whole operation with backoff.
    ///
    /// Each attempt runs under the discovery deadline; per-page progress
    /// bumps the activity tracker so a hung discovery is caught by the
    /// watchdog rather than waiting out every discovery deadline.
    async fn discover_ids(
        &self,
        tracker: &ActivityTracker,
        remote_total: Option<u64>,
        on_progress: Option<&ProgressCallback>,
    ) -> std::result::Result<Vec<i64>, RemoteError> {
        let attempt_once = || async {
            let page_progress = |fetched_so_far: usize, total: Option<u64>| {
                tracker.bump();
                emit(
                    on_progress,
                    SyncProgress::DiscoveredPage {
                        fetched_so_far,
                        total: total.or(remote_total),
                    },
                );
            };

            tokio::time::timeout(
                self.options.discovery_timeout,
                self.client.list_ids(Some(&page_progress)),
            )
            .await
            .map_err(|_| RemoteError::Timeout)?
        };

        attempt_once
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(std::time::Duration::from_secs(1))
                    .with_max_delay(std::time::Duration::from_secs(60))
                    .with_max_times(self.options.discovery_retries as usize)
                    .with_jitter(),
            )
            .when(RemoteError::is_retryable)
            .notify(|err, dur| {
                tracing::warn!(
                    error = %err,
                    retry_in_ms = dur.as_millis() as u64,
                    "Id discovery attempt failed, retrying"
                );
            })
            .await
    }

    /// Sweep the failed id set, pass by pass, until it empties or the
    /// planned passes run out.
    async fn retry_failed_ids(
        &self,
        state: &mut RunState,
        tracker: &ActivityTracker,
        token: &CancellationToken,
        on_progress: Option<&ProgressCallback>,
    ) -> std::result::Result<(), SyncError> {
        for plan in plan_passes(&self.options) {
            if state.failed_ids.is_empty() {
                break;
            }
            state.retry_passes = plan.pass;

            emit(
                on_progress,
                SyncProgress::RetryPass {
                    pass: plan.pass,
                    remaining: state.failed_ids.len(),
                    concurrency: plan.concurrency,
                    per_item_timeout_secs: plan.per_item_timeout.as_secs(),
                },
            );
            tracing::info!(
                pass = plan.pass,
                remaining = state.failed_ids.len(),
                concurrency = plan.concurrency,
                timeout_secs = plan.per_item_timeout.as_secs(),
                "Starting retry pass"
            );

            tokio::select! {
                _ = token.cancelled() => return Err(self.abort(state, on_progress).await),
                _ = tokio::time::sleep(plan.delay) => {}
            }

            let entering: Vec<i64> = std::mem::take(&mut state.failed_ids);
            let mut still_failing = Vec::new();
            let mut recovered = 0usize;

            for (window_index, window) in entering.chunks(plan.concurrency).enumerate() {
                let fetched = tokio::select! {
                    _ = token.cancelled() => None,
                    outcome = fetch_batch(
                        &self.client,
                        window,
                        plan.concurrency,
                        plan.per_item_timeout,
                    ) => Some(outcome),
                };

                let Some(outcome) = fetched else {
                    // Unswept ids stay in the failed set for the final count.
                    state.failed_ids = still_failing;
                    state
                        .failed_ids
                        .extend_from_slice(&entering[window_index * plan.concurrency..]);
                    return Err(self.abort(state, on_progress).await);
                };

                recovered += outcome.succeeded.len();
                state.fetched += outcome.succeeded.len() as i64;
                state.buffer.extend(outcome.succeeded);
                still_failing.extend(outcome.failed_ids);
                tracker.bump();

                if state.buffer.len() >= self.options.flush_threshold {
                    self.flush(state, false, tracker, on_progress).await;
                }
            }
            if !state.buffer.is_empty() {
                self.flush(state, false, tracker, on_progress).await;
            }

            emit(
                on_progress,
                SyncProgress::RetryPassComplete {
                    pass: plan.pass,
                    recovered,
                    still_failing: still_failing.len(),
                },
            );
            state.failed_ids = still_failing;
        }

        Ok(())
    }

    /// Persist the buffer and checkpoint the result.
    ///
    /// `advance_resume_point` is true only during streaming: retry passes
    /// revisit earlier ids and must not move the resume point backwards.
    async fn flush(
        &self,
        state: &mut RunState,
        advance_resume_point: bool,
        tracker: &ActivityTracker,
        on_progress: Option<&ProgressCallback>,
    ) {
        let batch = std::mem::take(&mut state.buffer);
        if batch.is_empty() {
            return;
        }

        emit(on_progress, SyncProgress::PersistingBatch { count: batch.len() });
        let stats = self.sink.upsert_batch(batch).await;
        state.created += stats.created as i64;
        state.updated += stats.updated as i64;
        state.persist_errors += stats.errors as i64;
        tracker.bump();

        let update = ProgressUpdate {
            fetched_count: Some(state.fetched),
            created_count: Some(state.created),
            updated_count: Some(state.updated),
            error_count: Some(state.persist_errors),
            last_processed_id: if advance_resume_point {
                state.last_window_id
            } else {
                None
            },
            ..Default::default()
        };
        self.checkpoint(state.run_id, update).await;
    }

    /// Write a mid-run checkpoint, logging instead of failing the run.
    async fn checkpoint(&self, run_id: Uuid, update: ProgressUpdate) {
        if let Err(e) = self.store.update_progress(run_id, update).await {
            tracing::warn!(run_id = %run_id, error = %e, "Checkpoint write failed, continuing");
        }
    }

    /// Terminal path for cancellation and watchdog stalls.
    ///
    /// The watchdog may have already failed the row with a stall message;
    /// in that case the row is left as-is and its message is reused.
    async fn abort(&self, state: &RunState, on_progress: Option<&ProgressCallback>) -> SyncError {
        let existing_message = match self.store.find_run(state.run_id).await {
            Ok(Some(run)) if run.status == SyncStatus::Failed => run.error_message,
            _ => None,
        };

        let message = match existing_message {
            Some(message) => message,
            None => {
                let message = "Sync cancelled".to_string();
                self.finalize_failed_quiet(state, &message).await;
                message
            }
        };

        emit(
            on_progress,
            SyncProgress::Error {
                message: message.clone(),
            },
        );
        SyncError::Aborted { message }
    }

    async fn finalize_failed(
        &self,
        state: &RunState,
        message: &str,
        on_progress: Option<&ProgressCallback>,
    ) {
        self.finalize_failed_quiet(state, message).await;
        emit(
            on_progress,
            SyncProgress::Error {
                message: message.to_string(),
            },
        );
    }

    async fn finalize_failed_quiet(&self, state: &RunState, message: &str) {
        if let Err(e) = self
            .store
            .finalize(
                state.run_id,
                SyncStatus::Failed,
                state.counts(),
                Some(message.to_string()),
            )
            .await
        {
            tracing::error!(run_id = %state.run_id, error = %e, "Failed to finalize failed run");
        }
    }

    fn report(&self, state: &RunState, completed: bool) -> SyncReport {
        SyncReport {
            run_id: state.run_id,
            completed,
            total_expected: Some(state.total_expected),
            fetched: state.fetched,
            created: state.created,
            updated: state.updated,
            errors: state.persist_errors,
            retry_passes: state.retry_passes,
            failed_ids: state
                .failed_ids
                .iter()
                .copied()
                .take(FAILED_ID_SAMPLE)
                .collect(),
        }
    }
}

fn incomplete_message(covered: i64, expected: i64, failed_ids: &[i64]) -> String {
    let shortfall_pct = if expected > 0 {
        100.0 * (expected - covered).max(0) as f64 / expected as f64
    } else {
        0.0
    };
    let mut message = format!(
        "Sync incomplete: covered {covered} of {expected} expected records ({shortfall_pct:.1}% short)"
    );
    if !failed_ids.is_empty() {
        let sample: Vec<String> = failed_ids
            .iter()
            .take(FAILED_ID_SAMPLE)
            .map(|id| id.to_string())
            .collect();
        message.push_str(&format!(
            "; {} ids still failing: {}",
            failed_ids.len(),
            sample.join(", ")
        ));
        if failed_ids.len() > FAILED_ID_SAMPLE {
            message.push_str(&format!(
                " and {} more",
                failed_ids.len() - FAILED_ID_SAMPLE
            ));
        }
    }
    message
}
