//! Shared types and storage for NetWarden.
//!
//! Used by the daemon and by integration tests.

pub mod alert;
pub mod db;
pub mod error;
pub mod state;

pub use alert::{Alert, AlertCategory, AlertLevel};
pub use db::Database;
pub use error::WardenError;
pub use state::{ConnectivityState, StateContext};
