//! Kind discriminator for sync runs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The kind of synchronization a run performs.
///
/// The at-most-one-running rule is scoped per sync type, so additional
/// record families can sync concurrently without contending for the
/// same claim.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SyncType {
    /// Full reconciliation of the remote contact directory.
    #[sea_orm(string_value = "contact_bulk")]
    #[default]
    ContactBulk,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncType::ContactBulk => write!(f, "contact_bulk"),
        }
    }
}
