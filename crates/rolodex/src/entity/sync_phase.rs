//! Phase enum tracking where inside a run the engine currently is.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The stage a sync run is executing.
///
/// Stored as its own typed column so the watchdog and the status surface
/// can report where a run stalled without parsing free-text messages.
/// `error_message` remains human-readable detail only.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SyncPhase {
    /// Run row inserted, nothing started yet.
    #[sea_orm(string_value = "claiming")]
    #[default]
    Claiming,
    /// Enumerating the remote id set.
    #[sea_orm(string_value = "discovering")]
    Discovering,
    /// Main fetch-and-persist loop.
    #[sea_orm(string_value = "streaming")]
    Streaming,
    /// Sweeping previously failed ids.
    #[sea_orm(string_value = "retrying")]
    Retrying,
    /// Writing the terminal checkpoint.
    #[sea_orm(string_value = "finalizing")]
    Finalizing,
    /// Terminal checkpoint written.
    #[sea_orm(string_value = "done")]
    Done,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncPhase::Claiming => "claiming",
            SyncPhase::Discovering => "discovering",
            SyncPhase::Streaming => "streaming",
            SyncPhase::Retrying => "retrying",
            SyncPhase::Finalizing => "finalizing",
            SyncPhase::Done => "done",
        };
        write!(f, "{s}")
    }
}
