//! Service-specific tests
//!
//! Each service has its own test file with dedicated fixtures and helpers.


// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::time::Duration;

    use crate::services::connection::ConnectionSettings;

    /// Command timeout short enough to exercise the timeout path quickly
    pub const SHORT_TIMEOUT: Duration = Duration::from_millis(100);

    pub fn settings(command_timeout: Duration) -> ConnectionSettings {
        ConnectionSettings {
            command_timeout,
            read_buffer_size: 4096,
        }
    }
}
