//! Service implementations
//!
//! Real implementations that touch the OS: port probing, the worker
//! process, health probes and the status file.

pub mod health_monitor;
pub mod port_allocator;
pub mod process_metrics;
pub mod process_output;
pub mod process_supervisor;
pub mod status_file;

#[cfg(test)]
mod tests;

pub use health_monitor::HealthMonitor;
pub use port_allocator::PortAllocator;
pub use process_supervisor::ProcessSupervisor;
pub use status_file::{StatusFile, StatusSnapshot};
