//! Bridge-specific error types

use std::time::Duration;
use thiserror::Error;
use shared::SharedError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to bind command listener on {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input: {reason}")]
    MalformedInput { reason: String },

    #[error("Unknown command type: {command_type}")]
    UnknownCommandType { command_type: String },

    #[error("Error executing command '{command_type}': {message}")]
    DispatchException { command_type: String, message: String },

    #[error("Command timed out after {} seconds", timeout.as_secs_f64())]
    CommandTimeout { timeout: Duration },

    #[error("Bridge is not running")]
    NotRunning,

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput { reason: reason.into() }
    }

    /// Stable machine-readable code carried in error responses
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::BindError { .. } => "bind_error",
            BridgeError::MalformedInput { .. } => "malformed_input",
            BridgeError::UnknownCommandType { .. } => "unknown_command_type",
            BridgeError::DispatchException { .. } => "dispatch_exception",
            BridgeError::CommandTimeout { .. } => "command_timeout",
            BridgeError::NotRunning => "not_running",
            BridgeError::Shared(_) => "shared_error",
            BridgeError::Io(_) => "io_error",
            BridgeError::Json(_) => "json_error",
        }
    }
}

/// Error returned by a host-supplied command dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),

    #[error("Command '{0}' is not in the approved action list")]
    NotApproved(String),
}

impl DispatchError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
