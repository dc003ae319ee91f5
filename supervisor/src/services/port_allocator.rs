//! Named port allocation within a configured range
//!
//! Each service name owns at most one port. Availability is probed by a
//! test bind that is released immediately, so the answer can be stale by
//! the time the worker binds; a failed bind in the worker is the
//! authoritative signal and is handled by restart.

use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use shared::{component_debug, component_info, component_warn, ComponentId, PortRange};

use crate::error::{SupervisorError, SupervisorResult};
use crate::types::{ConflictReport, PortAllocation, PortUsageReport, ResolvedConflict, UnresolvedConflict};

/// Attempts before giving up when another caller keeps claiming our candidate
const MAX_CLAIM_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct PortAllocator {
    host: String,
    range: PortRange,
    allocations: Mutex<HashMap<String, PortAllocation>>,
}

impl PortAllocator {
    pub fn new(host: impl Into<String>, range: PortRange) -> Self {
        Self {
            host: host.into(),
            range,
            allocations: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PortAllocation>> {
        self.allocations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Whether a listener could bind `port` right now
    pub fn is_port_available(&self, port: u16) -> bool {
        port != 0 && TcpListener::bind((self.host.as_str(), port)).is_ok()
    }

    /// Allocate a port for `service`, preferring `preferred` when it is free
    ///
    /// A live allocation whose port still probes free is returned as-is.
    /// Ports held by other services are never handed out twice.
    pub fn allocate(&self, service: &str, preferred: Option<u16>) -> SupervisorResult<u16> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let (existing, taken) = self.snapshot_for(service);

            if let Some(port) = existing {
                if self.is_port_available(port) && self.claim(service, port) {
                    return Ok(port);
                }
                component_warn!(
                    ComponentId::current(),
                    "⚠️ Port {} held by '{}' is no longer available, reallocating",
                    port,
                    service
                );
            }

            let candidate = preferred
                .filter(|port| !taken.contains(port) && self.is_port_available(*port))
                .or_else(|| {
                    self.range
                        .iter()
                        .filter(|port| !taken.contains(port))
                        .find(|port| self.is_port_available(*port))
                });

            let Some(port) = candidate else {
                // Keep the stale record visible, marked invalid
                if let Some(stale) = self.lock().get_mut(service) {
                    stale.valid = false;
                }
                return Err(SupervisorError::PortExhaustion {
                    service: service.to_string(),
                    min: self.range.min,
                    max: self.range.max,
                });
            };

            if self.claim(service, port) {
                if preferred.is_some_and(|p| p != port) {
                    component_info!(
                        ComponentId::current(),
                        "🔀 Preferred port {:?} unavailable for '{}', using {}",
                        preferred,
                        service,
                        port
                    );
                } else {
                    component_debug!(ComponentId::current(), "📌 Allocated port {} to '{}'", port, service);
                }
                return Ok(port);
            }
        }

        Err(SupervisorError::PortExhaustion {
            service: service.to_string(),
            min: self.range.min,
            max: self.range.max,
        })
    }

    /// Existing port for `service` plus the ports every other service holds
    fn snapshot_for(&self, service: &str) -> (Option<u16>, HashSet<u16>) {
        let allocations = self.lock();
        let existing = allocations.get(service).map(|a| a.port);
        let taken = allocations
            .values()
            .filter(|a| a.service != service)
            .map(|a| a.port)
            .collect();
        (existing, taken)
    }

    /// Record `port` for `service` unless another service claimed it since
    /// the snapshot was taken
    fn claim(&self, service: &str, port: u16) -> bool {
        let mut allocations = self.lock();
        let stolen = allocations.values().any(|a| a.service != service && a.port == port);
        if stolen {
            return false;
        }

        match allocations.get_mut(service) {
            Some(existing) if existing.port == port => existing.valid = true,
            _ => {
                allocations.insert(
                    service.to_string(),
                    PortAllocation {
                        service: service.to_string(),
                        port,
                        allocated_at: Utc::now(),
                        valid: true,
                    },
                );
            }
        }
        true
    }

    /// Forget the allocation for `service`. Unknown names are ignored.
    pub fn release(&self, service: &str) -> Option<u16> {
        let released = self.lock().remove(service).map(|a| a.port);
        if let Some(port) = released {
            component_debug!(ComponentId::current(), "🔓 Released port {} from '{}'", port, service);
        }
        released
    }

    pub fn get(&self, service: &str) -> Option<u16> {
        self.lock().get(service).map(|a| a.port)
    }

    pub fn allocation(&self, service: &str) -> Option<PortAllocation> {
        self.lock().get(service).cloned()
    }

    /// Every allocation, ordered by service name
    pub fn all(&self) -> Vec<PortAllocation> {
        let mut allocations: Vec<PortAllocation> = self.lock().values().cloned().collect();
        allocations.sort_by(|a, b| a.service.cmp(&b.service));
        allocations
    }

    /// Probe every port in the range
    pub fn usage_report(&self) -> PortUsageReport {
        let allocations = self.all();
        let total = self.range.port_count();
        let available = self.range.iter().filter(|port| self.is_port_available(*port)).count();

        PortUsageReport {
            range: self.range,
            total,
            available,
            occupied: total - available,
            allocations,
        }
    }

    /// Re-probe every allocation and move services whose port was taken
    pub fn resolve_conflicts(&self) -> ConflictReport {
        let mut report = ConflictReport::default();

        for allocation in self.all() {
            if self.is_port_available(allocation.port) {
                continue;
            }

            if let Some(entry) = self.lock().get_mut(&allocation.service) {
                entry.valid = false;
            }

            match self.allocate(&allocation.service, None) {
                Ok(new_port) => {
                    component_info!(
                        ComponentId::current(),
                        "🔧 Moved '{}' from port {} to {}",
                        allocation.service,
                        allocation.port,
                        new_port
                    );
                    report.resolved.push(ResolvedConflict {
                        service: allocation.service,
                        old_port: allocation.port,
                        new_port,
                    });
                }
                Err(e) => {
                    component_warn!(
                        ComponentId::current(),
                        "⚠️ Could not move '{}' off port {}: {}",
                        allocation.service,
                        allocation.port,
                        e
                    );
                    report.unresolved.push(UnresolvedConflict {
                        service: allocation.service,
                        old_port: allocation.port,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
