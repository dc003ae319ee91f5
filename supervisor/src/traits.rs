//! Trait definitions with mockall annotations for testing
//!
//! The health monitor only needs to observe and restart the worker, so it
//! depends on this narrow view instead of the full supervisor.

use async_trait::async_trait;

use crate::error::SupervisorResult;
use crate::types::{ProcessInfo, ServerStatus};

/// What the health monitor may see and do to the supervised worker
#[mockall::automock]
#[async_trait]
pub trait WorkerControl: Send + Sync {
    /// Current lifecycle status
    async fn status(&self) -> ServerStatus;

    /// Snapshot of the worker process, `None` when no worker was started
    async fn query(&self) -> Option<ProcessInfo>;

    /// Stop, wait the configured delay, then start again
    async fn restart(&self) -> SupervisorResult<()>;

    /// Message from the most recent failure, if the worker is in `Error`
    async fn last_error(&self) -> Option<String>;
}
