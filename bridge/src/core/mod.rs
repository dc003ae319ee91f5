//! Core bridge logic
//!
//! Pure, synchronous pieces shared by the network side and the host tick:
//! input classification, the pending-command table, the approval policy
//! and the executor that drains queued commands into the dispatcher.

pub mod executor;
pub mod input;
pub mod pending;
pub mod policy;

pub use executor::{CommandExecutor, DrainReport};
pub use input::{classify, decode_request, Inbound};
pub use pending::{CompletionHandle, PendingEntry, PendingTable};
pub use policy::ActionPolicy;
