//! Service-specific tests
//!
//! Each service has its own test file with dedicated fixtures and helpers.

#[cfg(test)]
mod port_allocation;

// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::net::TcpListener;

    use shared::PortRange;

    use crate::services::PortAllocator;

    /// A port the OS just reported free
    pub fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Allocator whose range is a single currently-free port
    pub fn single_port_allocator() -> (PortAllocator, u16) {
        let port = free_port();
        (PortAllocator::new("127.0.0.1", PortRange::new(port, port).unwrap()), port)
    }

    /// Allocate `service` on a free port, then occupy that port with a
    /// listener so connection probes succeed
    pub fn allocate_listening(allocator: &PortAllocator, service: &str) -> (u16, TcpListener) {
        let port = allocator.allocate(service, Some(free_port())).unwrap();
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        (port, listener)
    }
}
