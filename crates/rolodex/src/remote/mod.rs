//! Remote contact directory interface.
//!
//! The engine never talks to a transport directly; everything goes
//! through the [`RemoteDirectory`] trait so concrete HTTP clients (and
//! test fakes) plug in from outside.

mod errors;
mod types;

pub use errors::{short_error_message, RemoteError, Result};
pub use types::{DiscoveryProgress, RemoteContact, RemoteDirectory};
