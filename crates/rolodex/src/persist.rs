//! Local persistence for fetched contacts.
//!
//! The sink owns the insert-or-update decision per record. A batch is a
//! unit of durability for checkpointing purposes, not a transaction:
//! individual record failures are logged and counted, never allowed to
//! poison the rest of the batch.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::db::is_retryable_db_error;
use crate::entity::contact::{ActiveModel, Column, Entity as Contact, Model};
use crate::remote::RemoteContact;

/// Attempts per record on transient database errors.
const UPSERT_ATTEMPTS: u32 = 3;
/// Initial backoff in milliseconds between attempts (doubles each retry).
const UPSERT_BACKOFF_MS: u64 = 100;

/// Outcome counters for one persisted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct UpsertStats {
    /// Rows inserted.
    pub created: u64,
    /// Rows updated.
    pub updated: u64,
    /// Records that failed to persist.
    pub errors: u64,
}

impl UpsertStats {
    /// Fold another batch's counters into this one.
    pub fn merge(&mut self, other: UpsertStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.errors += other.errors;
    }
}

/// Writes remote contacts into the local `contacts` table.
///
/// Like [`CheckpointStore`](crate::checkpoint::CheckpointStore), holds a
/// shared connection handle so clones write through the same pool.
#[derive(Clone)]
pub struct PersistenceSink {
    db: Arc<DatabaseConnection>,
}

impl PersistenceSink {
    pub fn new(db: impl Into<Arc<DatabaseConnection>>) -> Self {
        Self { db: db.into() }
    }

    /// Upsert a batch of remote contacts by their external id.
    ///
    /// Existing rows are updated in place (last write wins), new ids are
    /// inserted. Returns counters; never an error, so a bad record cannot
    /// abort a sync run.
    pub async fn upsert_batch(&self, contacts: Vec<RemoteContact>) -> UpsertStats {
        let mut stats = UpsertStats::default();

        for contact in contacts {
            let external_id = contact.external_id;
            match self.upsert_one(contact).await {
                Ok(true) => stats.created += 1,
                Ok(false) => stats.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        external_id = external_id,
                        error = %e,
                        "Failed to persist contact"
                    );
                    stats.errors += 1;
                }
            }
        }

        stats
    }

    /// Returns `Ok(true)` when the record was inserted, `Ok(false)` on update.
    async fn upsert_one(&self, contact: RemoteContact) -> Result<bool, sea_orm::DbErr> {
        let mut backoff_ms = UPSERT_BACKOFF_MS;
        let mut attempt = 0;

        loop {
            match self.try_upsert_one(&contact).await {
                Ok(created) => return Ok(created),
                Err(e) if is_retryable_db_error(&e) && attempt + 1 < UPSERT_ATTEMPTS => {
                    tracing::debug!(
                        external_id = contact.external_id,
                        attempt = attempt + 1,
                        backoff_ms = backoff_ms,
                        error = %e,
                        "Transient error persisting contact, retrying"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_upsert_one(&self, contact: &RemoteContact) -> Result<bool, sea_orm::DbErr> {
        let existing = Contact::find()
            .filter(Column::ExternalId.eq(contact.external_id))
            .one(self.db.as_ref())
            .await?;

        let mut row = to_active_model(contact);
        match existing {
            Some(existing) => {
                row.id = Set(existing.id);
                row.update(self.db.as_ref()).await?;
                Ok(false)
            }
            None => {
                row.id = Set(Uuid::new_v4());
                row.insert(self.db.as_ref()).await?;
                Ok(true)
            }
        }
    }

    /// Look up a contact by its remote id.
    pub async fn find_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Contact::find()
            .filter(Column::ExternalId.eq(external_id))
            .one(self.db.as_ref())
            .await
    }
}

fn to_active_model(contact: &RemoteContact) -> ActiveModel {
    ActiveModel {
        external_id: Set(contact.external_id),
        full_name: Set(contact.full_name.clone()),
        email: Set(contact.email.clone()),
        phone: Set(contact.phone.clone()),
        title: Set(contact.title.clone()),
        company: Set(contact.company.clone()),
        tags: Set(serde_json::json!(contact.tags)),
        remote_metadata: Set(contact.metadata.clone()),
        created_at_remote: Set(contact.created_at.map(|dt| dt.fixed_offset())),
        updated_at_remote: Set(contact.updated_at.map(|dt| dt.fixed_offset())),
        last_synced_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
}
