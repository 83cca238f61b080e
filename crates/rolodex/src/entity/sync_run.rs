//! SyncRun entity - the durable checkpoint row for one sync attempt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::sync_phase::SyncPhase;
use crate::entity::sync_status::SyncStatus;
use crate::entity::sync_type::SyncType;

/// SyncRun model - one row per attempt, running or finished.
///
/// Counters are monotonically non-decreasing for the lifetime of the
/// row and obey `created + updated + errors <= fetched <= total_expected`
/// (when the total is known).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// What kind of sync this run performs.
    pub sync_type: SyncType,
    /// Lifecycle status. At most one `running` row exists per sync type.
    pub status: SyncStatus,
    /// Stage the run is (or was) executing.
    pub phase: SyncPhase,

    /// When the run was claimed.
    pub started_at: DateTimeWithTimeZone,
    /// When the terminal checkpoint was written. Unset while running.
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Remote record count, or the discovered id-list length when the
    /// remote count was unavailable. Null until discovery finishes.
    pub total_expected: Option<i64>,

    /// Records fetched successfully from the remote.
    pub fetched_count: i64,
    /// Records inserted locally.
    pub created_count: i64,
    /// Records updated locally.
    pub updated_count: i64,
    /// Records fetched but not persisted locally. Ids that were never
    /// fetched are named in `error_message` instead of counted here.
    pub error_count: i64,

    /// External id of the last record whose batch was durably persisted.
    /// The authoritative resume point.
    pub last_processed_id: Option<i64>,

    /// Human-readable failure or cancellation detail.
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Fraction of the expected total already fetched, if the total is known.
    pub fn progress_fraction(&self) -> Option<f64> {
        match self.total_expected {
            Some(total) if total > 0 => Some(self.fetched_count as f64 / total as f64),
            Some(_) => Some(1.0),
            None => None,
        }
    }

    /// Whether a later run can pick up where this one stopped.
    ///
    /// Runs that died before writing any checkpoint have nothing to
    /// resume from.
    pub fn is_resumable(&self) -> bool {
        self.status != SyncStatus::Completed && self.last_processed_id.is_some()
    }

    /// Records this run accounted for, successfully or not.
    pub fn processed_count(&self) -> i64 {
        self.fetched_count + self.error_count
    }
}
