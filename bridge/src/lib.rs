//! Command bridge for single-threaded hosts
//!
//! Accepts concurrent TCP clients on loopback, queues each request in a
//! pending table, and lets the host execute them from its own cooperative
//! tick via `BridgeContext::drain`. Responses travel back to the
//! originating connection through a one-shot completion handle.

pub mod bridge;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use bridge::BridgeContext;
pub use core::{CompletionHandle, DrainReport, PendingTable};
pub use error::{BridgeError, BridgeResult, DispatchError};
pub use services::{CommandRegistry, PidFile};
pub use traits::CommandDispatcher;
pub use types::{Command, CommandId, CommandRequest, Params, Response, ResponseStatus};
