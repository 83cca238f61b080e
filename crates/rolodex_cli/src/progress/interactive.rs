use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rolodex::sync::SyncProgress;

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Spinner for id discovery.
    discover_bar: Option<ProgressBar>,
    /// Bar for the streaming fetch phase.
    fetch_bar: Option<ProgressBar>,
    /// Bar for retry passes, re-lengthed per pass.
    retry_bar: Option<ProgressBar>,
    /// Expected total once discovery settles it.
    total: Option<u64>,
}

/// Interactive progress reporter using indicatif.
pub(crate) struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub(crate) fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::Started { total } => {
                state.total = total;
            }

            SyncProgress::DiscoveringIds => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(std::time::Duration::from_millis(100));
                pb.set_prefix(format!("{:12}", "Discovering"));
                pb.set_message("Enumerating remote ids...");
                state.discover_bar = Some(pb);
            }

            SyncProgress::DiscoveredPage {
                fetched_so_far,
                total,
            } => {
                if let Some(ref pb) = state.discover_bar {
                    let msg = match total {
                        Some(total) => format!("{}/{} ids", fetched_so_far, total),
                        None => format!("{} ids", fetched_so_far),
                    };
                    pb.set_message(msg);
                }
            }

            SyncProgress::DiscoveryComplete { total } => {
                if let Some(ref pb) = state.discover_bar {
                    pb.finish_with_message(format!("✓ {} ids", total));
                }
                state.total = state.total.or(Some(total as u64));

                let pb = self.multi.add(ProgressBar::new(
                    state.total.unwrap_or(total as u64),
                ));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "Fetching"));
                pb.set_message("Fetching contacts...");
                state.fetch_bar = Some(pb);
            }

            SyncProgress::Resuming {
                resume_id,
                resume_index,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_position(resume_index as u64 + 1);
                    pb.set_message(format!("Resuming after id {}", resume_id));
                }
            }

            SyncProgress::ResumePointMissing { resume_id } => {
                drop(state);
                self.multi
                    .println(format!(
                        "⚠ checkpoint id {} missing remotely, starting over",
                        resume_id
                    ))
                    .ok();
            }

            SyncProgress::BatchComplete {
                batch_size: _,
                total_processed,
                total,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    if !pb.is_finished() {
                        pb.set_position(total_processed as u64);
                        let msg = match total.or(state.total) {
                            Some(total) => format!("{}/{} processed", total_processed, total),
                            None => format!("{} processed", total_processed),
                        };
                        pb.set_message(msg);
                    }
                }
            }

            SyncProgress::PersistingBatch { count } => {
                let pb = state.retry_bar.as_ref().or(state.fetch_bar.as_ref());
                if let Some(pb) = pb {
                    if !pb.is_finished() {
                        pb.set_message(format!("Flushing {} contacts...", count));
                    }
                }
            }

            SyncProgress::RetryPass {
                pass,
                remaining,
                concurrency: _,
                per_item_timeout_secs,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    if !pb.is_finished() {
                        pb.finish();
                    }
                }

                let pb = match state.retry_bar {
                    Some(ref pb) => pb.clone(),
                    None => {
                        let pb = self.multi.add(ProgressBar::new(remaining as u64));
                        pb.set_style(Self::bar_style());
                        pb.set_prefix(format!("{:12}", "Retrying"));
                        state.retry_bar = Some(pb.clone());
                        pb
                    }
                };
                pb.set_length(remaining as u64);
                pb.set_position(0);
                pb.set_message(format!(
                    "Pass {} ({} ids, {}s timeout)",
                    pass, remaining, per_item_timeout_secs
                ));
            }

            SyncProgress::RetryPassComplete {
                pass,
                recovered,
                still_failing,
            } => {
                if let Some(ref pb) = state.retry_bar {
                    pb.set_position(pb.length().unwrap_or(0));
                    let msg = if still_failing > 0 {
                        format!(
                            "Pass {}: {} recovered, {} still failing",
                            pass, recovered, still_failing
                        )
                    } else {
                        format!("Pass {}: {} recovered", pass, recovered)
                    };
                    pb.set_message(msg);
                }
            }

            SyncProgress::Warning { message } => {
                drop(state);
                self.multi.println(format!("⚠ {}", message)).ok();
            }

            SyncProgress::Completed {
                fetched,
                created,
                updated,
                retry_passes,
            } => {
                if let Some(ref pb) = state.retry_bar {
                    pb.finish_with_message(format!("✓ done after {} passes", retry_passes));
                }
                if let Some(ref pb) = state.fetch_bar {
                    pb.finish_with_message(format!(
                        "✓ {} fetched ({} created, {} updated)",
                        fetched, created, updated
                    ));
                }
            }

            SyncProgress::Error { message } => {
                for pb in [&state.discover_bar, &state.fetch_bar, &state.retry_bar]
                    .into_iter()
                    .flatten()
                {
                    if !pb.is_finished() {
                        pb.abandon();
                    }
                }
                drop(state);
                self.multi.println(format!("✗ {}", message)).ok();
            }

            _ => {}
        }
    }

    /// Finish all progress bars.
    pub(crate) fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for pb in [&state.discover_bar, &state.fetch_bar, &state.retry_bar]
            .into_iter()
            .flatten()
        {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>5}/{len:5} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
