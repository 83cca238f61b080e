//! Concurrent window fetcher for remote contacts.
//!
//! One window of ids is fetched at a time: each id gets its own task
//! under a per-item deadline, and the window as a whole runs under a
//! safety ceiling of `per_item_timeout * ids.len()`. The ceiling exists
//! for hangs the per-item deadline cannot see (a stuck executor, a
//! client that blocks before the deadline is armed); when it fires, the
//! window's outcome is untrustworthy, so every id in it is reported
//! failed rather than silently dropping the stragglers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::remote::{RemoteContact, RemoteDirectory};

/// Outcome of one fetch window. Fetch failures are data, not errors.
#[derive(Debug, Default)]
#[must_use]
pub struct BatchOutcome {
    /// Contacts fetched within their deadline.
    pub succeeded: Vec<RemoteContact>,
    /// Ids that failed, timed out, panicked, or were cut off by the
    /// window ceiling. Preserves the input order.
    pub failed_ids: Vec<i64>,
}

/// Safety ceiling for a whole window.
pub fn batch_ceiling(per_item_timeout: Duration, batch_len: usize) -> Duration {
    per_item_timeout.saturating_mul(batch_len.max(1) as u32)
}

/// Fetch one window of ids concurrently.
///
/// Never returns an error: every id ends up either in `succeeded` or in
/// `failed_ids`, exactly once.
pub async fn fetch_batch<C>(
    client: &Arc<C>,
    ids: &[i64],
    concurrency: usize,
    per_item_timeout: Duration,
) -> BatchOutcome
where
    C: RemoteDirectory + ?Sized + 'static,
{
    let ceiling = batch_ceiling(per_item_timeout, ids.len());
    fetch_batch_with_ceiling(client, ids, concurrency, per_item_timeout, ceiling).await
}

async fn fetch_batch_with_ceiling<C>(
    client: &Arc<C>,
    ids: &[i64],
    concurrency: usize,
    per_item_timeout: Duration,
    ceiling: Duration,
) -> BatchOutcome
where
    C: RemoteDirectory + ?Sized + 'static,
{
    if ids.is_empty() {
        return BatchOutcome::default();
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks: JoinSet<Option<RemoteContact>> = JoinSet::new();

    for &id in ids {
        let client = Arc::clone(client);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return None,
            };

            match tokio::time::timeout(per_item_timeout, client.fetch_by_id(id)).await {
                Ok(Ok(contact)) => Some(contact),
                Ok(Err(e)) => {
                    tracing::debug!(external_id = id, error = %e, "Contact fetch failed");
                    None
                }
                Err(_) => {
                    tracing::debug!(
                        external_id = id,
                        timeout_secs = per_item_timeout.as_secs(),
                        "Contact fetch timed out"
                    );
                    None
                }
            }
        });
    }

    let gather = async {
        let mut succeeded = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(contact)) => succeeded.push(contact),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Contact fetch task panicked");
                }
            }
        }
        succeeded
    };

    let succeeded = match tokio::time::timeout(ceiling, gather).await {
        Ok(succeeded) => succeeded,
        Err(_) => {
            tracing::warn!(
                batch_len = ids.len(),
                ceiling_secs = ceiling.as_secs(),
                "Fetch window hit its safety ceiling, discarding the whole window"
            );
            tasks.abort_all();
            return BatchOutcome {
                succeeded: Vec::new(),
                failed_ids: ids.to_vec(),
            };
        }
    };

    let fetched: HashSet<i64> = succeeded.iter().map(|c| c.external_id).collect();
    let failed_ids = ids
        .iter()
        .copied()
        .filter(|id| !fetched.contains(id))
        .collect();

    BatchOutcome {
        succeeded,
        failed_ids,
    }
}
