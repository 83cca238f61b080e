//! Contact entity - the local copy of a remote directory record.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Contact model - one row per remote contact, keyed by the remote id.
///
/// Rows are created on first successful fetch of an external id and
/// updated on every subsequent one. The engine never deletes contacts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contacts")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// The remote system's numeric id. Unique; the upsert idempotency key.
    #[sea_orm(unique)]
    pub external_id: i64,

    /// Display name as reported by the remote directory.
    pub full_name: String,
    /// Primary email address.
    pub email: Option<String>,
    /// Primary phone number.
    pub phone: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Employer / organization.
    pub company: Option<String>,

    /// Tag labels (stored as a JSON array for cross-database compatibility).
    #[sea_orm(column_type = "Json")]
    pub tags: serde_json::Value,

    /// Remote payload fields that don't fit the common schema.
    #[sea_orm(column_type = "Json")]
    pub remote_metadata: serde_json::Value,

    /// When the contact was created in the remote system.
    pub created_at_remote: Option<DateTimeWithTimeZone>,
    /// When the contact was last modified in the remote system.
    pub updated_at_remote: Option<DateTimeWithTimeZone>,

    /// When this row was last written by a sync run.
    pub last_synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Tag labels as strings, skipping any non-string array entries.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the contact carries any way to reach them.
    pub fn is_reachable(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }
}
