//! Supervisor data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared::PortRange;

/// Allocator service name for the worker's first port
pub const PRIMARY_SERVICE: &str = "primary";
/// Allocator service name for the worker's second port
pub const SECONDARY_SERVICE: &str = "secondary";

/// Lifecycle state of the supervised worker
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Ports handed to the worker through its environment
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerPorts {
    pub primary: u16,
    pub secondary: u16,
}

/// Point-in-time snapshot of the worker process
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub memory_bytes: Option<u64>,
    pub cpu_usage_percent: Option<f32>,
    pub exited: bool,
    pub exit_code: Option<i32>,
}

impl ProcessInfo {
    pub fn memory_mb(&self) -> Option<u64> {
        self.memory_bytes.map(|bytes| bytes / (1024 * 1024))
    }
}

/// Result of one health probe cycle
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthRecord {
    pub checked_at: DateTime<Utc>,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub details: Vec<String>,
}

/// A port handed out to a named service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PortAllocation {
    pub service: String,
    pub port: u16,
    pub allocated_at: DateTime<Utc>,
    /// Cleared when a re-probe finds the port taken
    pub valid: bool,
}

/// Full scan of the configured range, for diagnostics
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PortUsageReport {
    pub range: PortRange,
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub allocations: Vec<PortAllocation>,
}

/// Outcome of re-probing every tracked allocation
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConflictReport {
    pub resolved: Vec<ResolvedConflict>,
    pub unresolved: Vec<UnresolvedConflict>,
}

impl ConflictReport {
    pub fn is_clean(&self) -> bool {
        self.resolved.is_empty() && self.unresolved.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResolvedConflict {
    pub service: String,
    pub old_port: u16,
    pub new_port: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnresolvedConflict {
    pub service: String,
    pub old_port: u16,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&ServerStatus::Running).unwrap(), "\"running\"");
        assert_eq!(ServerStatus::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_memory_mb() {
        let info = ProcessInfo {
            pid: 1,
            started_at: Utc::now(),
            uptime_secs: 0,
            memory_bytes: Some(3 * 1024 * 1024 + 10),
            cpu_usage_percent: None,
            exited: false,
            exit_code: None,
        };
        assert_eq!(info.memory_mb(), Some(3));
    }
}
