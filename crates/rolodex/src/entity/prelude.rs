//! Common re-exports for convenient entity usage.

pub use super::contact::{
    ActiveModel as ContactActiveModel, Column as ContactColumn, Entity as Contact,
    Model as ContactModel,
};
pub use super::sync_phase::SyncPhase;
pub use super::sync_run::{
    ActiveModel as SyncRunActiveModel, Column as SyncRunColumn, Entity as SyncRun,
    Model as SyncRunModel,
};
pub use super::sync_status::SyncStatus;
pub use super::sync_type::SyncType;
