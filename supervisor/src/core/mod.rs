//! Core supervisor logic
//!
//! Pure state kept by the supervisor and health monitor, with no I/O.

pub mod health;
pub mod status;

pub use health::FailureTracker;
pub use status::StatusMachine;
