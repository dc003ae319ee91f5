//! Worker process supervisor
//!
//! Allocates two ports for an external worker process, launches it with
//! those ports in its environment, and keeps it alive: a periodic health
//! monitor probes the worker and restarts it after repeated failures.

pub mod core;
pub mod error;
pub mod services;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{SupervisorError, SupervisorResult};
pub use services::{HealthMonitor, PortAllocator, ProcessSupervisor, StatusFile, StatusSnapshot};
pub use traits::WorkerControl;
pub use types::{
    ConflictReport, HealthRecord, PortAllocation, PortUsageReport, ProcessInfo, ServerStatus, WorkerPorts,
    PRIMARY_SERVICE, SECONDARY_SERVICE,
};
