//! Supervisor-specific error types

use std::time::Duration;
use thiserror::Error;
use shared::SharedError;

use crate::types::ServerStatus;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn worker process: {reason}")]
    ProcessSpawnFailure { reason: String },

    #[error("Worker did not become ready within {timeout:?}")]
    ProcessStartupTimeout { timeout: Duration },

    #[error("No free port for service '{service}' in range {min}-{max}")]
    PortExhaustion { service: String, min: u16, max: u16 },

    #[error("Health check failed ({consecutive_failures} consecutive): {detail}")]
    HealthCheckFailure { consecutive_failures: u32, detail: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: ServerStatus, to: ServerStatus },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Supervisor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SupervisorError {
    pub fn spawn_failure(reason: impl Into<String>) -> Self {
        Self::ProcessSpawnFailure { reason: reason.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
