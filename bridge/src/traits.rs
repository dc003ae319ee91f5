//! Host collaborator contracts
//!
//! The bridge never knows the command vocabulary. Whatever embeds it
//! supplies a `CommandDispatcher` that maps a type string and parameter
//! bag to a JSON result.

use serde_json::Value;

use crate::error::DispatchError;
use crate::types::Params;

/// Executes one command on the host's cooperative loop
///
/// Called synchronously from `BridgeContext::drain`, so implementations
/// run on whatever thread the host ticks on. Unknown command types should
/// return `DispatchError::UnknownCommand` rather than panic; a panic is
/// still caught and reported as a dispatch failure.
#[mockall::automock]
pub trait CommandDispatcher: Send + Sync {
    fn dispatch(&self, command_type: &str, params: &Params) -> Result<Value, DispatchError>;
}
