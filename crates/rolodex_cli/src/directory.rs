//! File-backed remote directory.
//!
//! Reads a JSON export of the remote directory (an array of contact
//! objects) and serves it through the `RemoteDirectory` trait. Lets an
//! operator seed or reconcile a database from a snapshot without any
//! network transport; live directory clients implement the same trait
//! out of tree.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolodex::remote::{DiscoveryProgress, RemoteContact, RemoteDirectory, RemoteError};
use serde::Deserialize;

/// One contact object in the export file.
#[derive(Debug, Deserialize)]
struct ExportedContact {
    id: i64,
    full_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl From<ExportedContact> for RemoteContact {
    fn from(c: ExportedContact) -> Self {
        Self {
            external_id: c.id,
            full_name: c.full_name,
            email: c.email,
            phone: c.phone,
            title: c.title,
            company: c.company,
            tags: c.tags,
            created_at: c.created_at,
            updated_at: c.updated_at,
            metadata: c.metadata,
        }
    }
}

/// Remote directory served from a JSON export file.
pub(crate) struct FileDirectory {
    ids: Vec<i64>,
    records: HashMap<i64, RemoteContact>,
}

impl FileDirectory {
    /// Load an export file. Duplicate ids keep the last occurrence.
    pub(crate) fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read '{}': {}", path.display(), e))?;
        let exported: Vec<ExportedContact> = serde_json::from_str(&raw)
            .map_err(|e| format!("Cannot parse '{}': {}", path.display(), e))?;

        let mut ids = Vec::with_capacity(exported.len());
        let mut records = HashMap::with_capacity(exported.len());
        for contact in exported {
            let id = contact.id;
            if records.insert(id, RemoteContact::from(contact)).is_some() {
                tracing::warn!(id, "Duplicate id in export file, keeping the last occurrence");
            } else {
                ids.push(id);
            }
        }

        tracing::info!(path = %path.display(), contacts = ids.len(), "Loaded directory export");
        Ok(Self { ids, records })
    }
}

#[async_trait]
impl RemoteDirectory for FileDirectory {
    async fn count_all(&self) -> Result<Option<u64>, RemoteError> {
        Ok(Some(self.ids.len() as u64))
    }

    async fn list_ids(
        &self,
        on_progress: Option<DiscoveryProgress<'_>>,
    ) -> Result<Vec<i64>, RemoteError> {
        if let Some(cb) = on_progress {
            cb(self.ids.len(), Some(self.ids.len() as u64));
        }
        Ok(self.ids.clone())
    }

    async fn fetch_by_id(&self, id: i64) -> Result<RemoteContact, RemoteError> {
        self.records
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::api(format!("No contact with id {id} in export")))
    }
}
