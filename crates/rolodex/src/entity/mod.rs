//! SeaORM entity definitions for the rolodex database schema.

pub mod contact;
pub mod prelude;
pub mod sync_phase;
pub mod sync_run;
pub mod sync_status;
pub mod sync_type;
