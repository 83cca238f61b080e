//! Stall detection for long-running sync work.
//!
//! The engine bumps an [`ActivityTracker`] after every unit of real
//! progress (a discovery page, a fetch window, a flush). A background
//! watchdog polls the tracker; when nothing has moved for longer than
//! the stall threshold it fails the run's checkpoint, names the stalled
//! phase, and cancels the run token. It fires at most once and then
//! exits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::entity::sync_phase::SyncPhase;

#[derive(Debug)]
struct ActivityState {
    last_activity: Instant,
    phase: SyncPhase,
}

/// Shared progress marker: single writer (the orchestrator), polled by
/// the watchdog.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    state: Arc<Mutex<ActivityState>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ActivityState {
                last_activity: Instant::now(),
                phase: SyncPhase::Claiming,
            })),
        }
    }

    /// Record that work happened just now.
    pub fn bump(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.last_activity = Instant::now();
        }
    }

    /// Record a phase change. Also counts as activity.
    pub fn enter_phase(&self, phase: SyncPhase) {
        if let Ok(mut state) = self.state.lock() {
            state.phase = phase;
            state.last_activity = Instant::now();
        }
    }

    /// Time since the last recorded activity, with the phase it happened in.
    pub fn idle_for(&self) -> (Duration, SyncPhase) {
        match self.state.lock() {
            Ok(state) => (state.last_activity.elapsed(), state.phase),
            // A poisoned tracker means the writer panicked; report no
            // idleness and let the supervisor handle the panic.
            Err(_) => (Duration::ZERO, SyncPhase::Claiming),
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running watchdog. Dropping it aborts the watchdog task,
/// so a finalized run cannot be failed by a late stall verdict.
pub struct WatchdogGuard {
    handle: JoinHandle<()>,
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn a watchdog for the given run.
///
/// Polls every `interval`; once idleness exceeds `stall_threshold` it
/// writes a failed checkpoint (counters and resume point untouched) and
/// cancels `token`, then exits.
pub fn spawn_watchdog(
    tracker: ActivityTracker,
    store: CheckpointStore,
    run_id: Uuid,
    interval: Duration,
    stall_threshold: Duration,
    token: CancellationToken,
) -> WatchdogGuard {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let (idle, phase) = tracker.idle_for();
            if idle <= stall_threshold {
                continue;
            }

            let message = format!(
                "Sync stalled during {} phase: no progress for {}s",
                phase,
                idle.as_secs()
            );
            tracing::error!(run_id = %run_id, phase = %phase, idle_secs = idle.as_secs(), "Sync stalled, aborting run");

            if let Err(e) = store.fail_run(run_id, &message).await {
                tracing::error!(run_id = %run_id, error = %e, "Failed to write stall checkpoint");
            }
            token.cancel();
            return;
        }
    });

    WatchdogGuard { handle }
}
