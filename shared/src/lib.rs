//! Shared building blocks for the command bridge and worker supervisor
//!
//! Holds the pieces both components need: component identity for log
//! attribution, tracing setup and macros, and the configuration types.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{BridgeConfig, PortRange, StartupProbe, SupervisorConfig};
pub use errors::*;
pub use types::*;
