//! Retry pass scheduling for failed ids.
//!
//! Later passes assume the remote is struggling, so each pass narrows
//! the window, stretches the per-item deadline, and waits longer before
//! starting. The functions here are pure; the orchestrator drives the
//! actual sweeps.

use std::time::Duration;

use super::types::SyncOptions;

/// Parameters for one retry pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPlan {
    /// Pass number (1-indexed).
    pub pass: u32,
    /// Window width for this pass.
    pub concurrency: usize,
    /// Per-item deadline for this pass.
    pub per_item_timeout: Duration,
    /// Delay before the pass starts.
    pub delay: Duration,
}

/// Window width for a pass: the base halves, thirds, quarters... but
/// never drops below one.
pub fn pass_concurrency(base: usize, pass: u32) -> usize {
    (base / (pass as usize + 1)).max(1)
}

/// Per-item deadline for a pass: the base plus one step per prior pass.
pub fn pass_timeout(base: Duration, step: Duration, pass: u32) -> Duration {
    base + step.saturating_mul(pass)
}

/// Delay before a pass: grows linearly with the pass number.
pub fn pass_delay(unit: Duration, pass: u32) -> Duration {
    unit.saturating_mul(pass)
}

/// Plan every retry pass the options allow, in order.
pub fn plan_passes(options: &SyncOptions) -> impl Iterator<Item = PassPlan> + '_ {
    (1..=options.max_retry_passes).map(|pass| PassPlan {
        pass,
        concurrency: pass_concurrency(options.fetch_concurrency, pass),
        per_item_timeout: pass_timeout(
            options.per_item_timeout,
            options.retry_timeout_step,
            pass,
        ),
        delay: pass_delay(options.retry_pass_delay_unit, pass),
    })
}
