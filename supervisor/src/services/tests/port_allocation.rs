//! Tests for PortAllocator
//!
//! These bind real loopback sockets to occupy ports.

use std::net::TcpListener;

use shared::PortRange;

use super::common::{free_port, single_port_allocator};
use crate::error::SupervisorError;
use crate::services::PortAllocator;

/// A free preferred port is returned, and asking again returns the same one
#[test]
fn test_preferred_port_is_stable() {
    let allocator = PortAllocator::new("127.0.0.1", PortRange::new(6400, 6599).unwrap());
    let preferred = free_port();

    let first = allocator.allocate("primary", Some(preferred)).unwrap();
    let second = allocator.allocate("primary", Some(preferred)).unwrap();

    assert_eq!(first, preferred);
    assert_eq!(second, preferred);
    assert_eq!(allocator.all().len(), 1);
}

/// An occupied preferred port falls back to a scan of the range
#[test]
fn test_occupied_preferred_falls_back() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = occupied.local_addr().unwrap().port();
    let (allocator, fallback) = single_port_allocator();

    let port = allocator.allocate("primary", Some(taken)).unwrap();
    assert_ne!(port, taken);
    assert_eq!(port, fallback);
}

/// Two services never share a port, even when both prefer it
#[test]
fn test_services_never_share_a_port() {
    let preferred = free_port();
    let allocator = PortAllocator::new("127.0.0.1", PortRange::new(20000, 20999).unwrap());

    let primary = allocator.allocate("primary", Some(preferred)).unwrap();
    let secondary = allocator.allocate("secondary", Some(preferred)).unwrap();

    assert_eq!(primary, preferred);
    assert_ne!(secondary, primary);
}

/// No free port in range surfaces PortExhaustion and records nothing
#[test]
fn test_exhaustion() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let allocator = PortAllocator::new("127.0.0.1", PortRange::new(port, port).unwrap());

    let err = allocator.allocate("primary", None).unwrap_err();
    assert!(matches!(err, SupervisorError::PortExhaustion { .. }));
    assert_eq!(allocator.get("primary"), None);
}

/// A held port that stops probing free is replaced on the next allocate
#[test]
fn test_stale_allocation_is_replaced() {
    let (allocator, port) = single_port_allocator();
    let spare = free_port();

    assert_eq!(allocator.allocate("primary", None).unwrap(), port);
    let _squatter = TcpListener::bind(("127.0.0.1", port)).unwrap();

    let moved = allocator.allocate("primary", Some(spare)).unwrap();
    assert_eq!(moved, spare);
    assert_eq!(allocator.get("primary"), Some(spare));
}

/// Release is idempotent and unknown names are ignored
#[test]
fn test_release() {
    let (allocator, port) = single_port_allocator();
    allocator.allocate("primary", None).unwrap();

    assert_eq!(allocator.release("primary"), Some(port));
    assert_eq!(allocator.release("primary"), None);
    assert_eq!(allocator.release("never-allocated"), None);
    assert_eq!(allocator.get("primary"), None);
}

/// Conflict resolution moves services whose port was taken
#[test]
fn test_resolve_conflicts() {
    let allocator = PortAllocator::new("127.0.0.1", PortRange::new(20000, 20999).unwrap());
    let port = allocator.allocate("primary", Some(free_port())).unwrap();

    assert!(allocator.resolve_conflicts().is_clean());

    let _squatter = TcpListener::bind(("127.0.0.1", port)).unwrap();
    let report = allocator.resolve_conflicts();

    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.resolved[0].old_port, port);
    assert_ne!(report.resolved[0].new_port, port);
    assert_eq!(allocator.get("primary"), Some(report.resolved[0].new_port));
    assert!(allocator.allocation("primary").unwrap().valid);
}

/// Unresolvable conflicts are reported, not raised, and the stale
/// allocation stays in place marked invalid
#[test]
fn test_unresolved_conflict() {
    let (allocator, port) = single_port_allocator();
    allocator.allocate("primary", None).unwrap();

    let _squatter = TcpListener::bind(("127.0.0.1", port)).unwrap();
    let report = allocator.resolve_conflicts();

    assert!(report.resolved.is_empty());
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].service, "primary");

    let stale = allocator.allocation("primary").unwrap();
    assert_eq!(stale.port, port);
    assert!(!stale.valid);
    assert_eq!(allocator.get("primary"), Some(port));
}

#[test]
fn test_usage_report() {
    let (allocator, port) = single_port_allocator();
    allocator.allocate("primary", None).unwrap();

    let report = allocator.usage_report();
    assert_eq!(report.total, 1);
    assert_eq!(report.available + report.occupied, 1);
    assert_eq!(report.allocations.len(), 1);
    assert_eq!(report.allocations[0].port, port);
}
