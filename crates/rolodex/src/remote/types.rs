use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::Result;

/// A contact record as the remote directory reports it.
#[derive(Debug, Clone)]
pub struct RemoteContact {
    /// The remote system's numeric id.
    pub external_id: i64,
    /// Display name.
    pub full_name: String,
    /// Primary email address.
    pub email: Option<String>,
    /// Primary phone number.
    pub phone: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Employer / organization.
    pub company: Option<String>,
    /// Tag labels.
    pub tags: Vec<String>,
    /// When the contact was created remotely.
    pub created_at: Option<DateTime<Utc>>,
    /// When the contact was last modified remotely.
    pub updated_at: Option<DateTime<Utc>>,
    /// Remote payload fields that don't fit the common schema.
    pub metadata: serde_json::Value,
}

/// Progress callback for id discovery: `(ids_so_far, total_if_known)`.
pub type DiscoveryProgress<'a> = &'a (dyn Fn(usize, Option<u64>) + Send + Sync);

/// Client interface to the remote contact directory.
///
/// # Implementation Notes
///
/// Implementors should:
/// - Handle pagination internally in `list_ids`, reporting progress per page
/// - Convert transport errors to the matching `RemoteError` variant so
///   retry classification works
/// - Make `fetch_by_id` cancel-safe: dropping the returned future must
///   abort the underlying request, since the engine enforces per-item
///   deadlines by dropping timed-out futures
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Total number of contacts the remote claims to have.
    ///
    /// Best-effort. Returns `Ok(None)` when the remote cannot answer;
    /// the engine then falls back to the discovered id-list length.
    async fn count_all(&self) -> Result<Option<u64>>;

    /// Enumerate every contact id in the directory.
    ///
    /// Must return the complete id set in a stable order. Invoked under a
    /// generous deadline and retried as a whole on failure, so partial
    /// results must not be returned on error.
    async fn list_ids(&self, on_progress: Option<DiscoveryProgress<'_>>) -> Result<Vec<i64>>;

    /// Fetch a single contact by its remote id.
    async fn fetch_by_id(&self, id: i64) -> Result<RemoteContact>;
}
