//! Worker status state machine
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`, with any state
//! allowed to fall into `Error`, and `Error` left only through `Starting`.

use crate::error::{SupervisorError, SupervisorResult};
use crate::types::ServerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMachine {
    current: ServerStatus,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self { current: ServerStatus::Stopped }
    }
}

impl StatusMachine {
    pub fn current(&self) -> ServerStatus {
        self.current
    }

    pub fn can_transition(from: ServerStatus, to: ServerStatus) -> bool {
        use ServerStatus::*;

        matches!(
            (from, to),
            (_, Error)
                | (Stopped, Starting)
                | (Error, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn transition(&mut self, to: ServerStatus) -> SupervisorResult<ServerStatus> {
        let from = self.current;
        if !Self::can_transition(from, to) {
            return Err(SupervisorError::InvalidTransition { from, to });
        }
        self.current = to;
        Ok(from)
    }
}
