//! Service implementations
//!
//! I/O-facing pieces of the bridge: the per-connection handler, the
//! closure-based command registry and the PID file.

pub mod connection;
pub mod pid_file;
pub mod registry;

#[cfg(test)]
mod tests;

pub use pid_file::PidFile;
pub use registry::CommandRegistry;
