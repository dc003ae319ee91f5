//! Drain step: turns queued payloads into dispatcher calls
//!
//! Runs on the host's cooperative tick. Nothing here awaits or sleeps;
//! the only blocking work is the synchronous dispatcher call itself.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{Map, Value};
use shared::{component_debug, component_warn, truncate_chars, ComponentId};

use crate::core::input::{classify, Inbound};
use crate::core::pending::PendingTable;
use crate::core::policy::ActionPolicy;
use crate::error::{BridgeError, DispatchError};
use crate::traits::CommandDispatcher;
use crate::types::{Command, CommandId, CommandRequest, Params, Response};

/// Longest prefix of a parameter value echoed back in diagnostics
const PARAM_SUMMARY_CHARS: usize = 20;

/// Outcome of a single drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries taken from the table
    pub processed: usize,
    /// Responses accepted by a still-waiting connection
    pub delivered: usize,
    /// Responses whose waiter had already gone
    pub abandoned: usize,
}

pub struct CommandExecutor {
    dispatcher: Arc<dyn CommandDispatcher>,
    policy: ActionPolicy,
}

impl CommandExecutor {
    pub fn new(dispatcher: Arc<dyn CommandDispatcher>, policy: ActionPolicy) -> Self {
        Self { dispatcher, policy }
    }

    /// Snapshot-and-clear the table, then execute every entry in turn
    pub fn drain(&self, table: &PendingTable) -> DrainReport {
        let entries = table.take_all();
        let mut report = DrainReport {
            processed: entries.len(),
            ..DrainReport::default()
        };

        for (id, entry) in entries {
            let response = self.execute_payload(id, &entry.payload);
            if entry.handle.resolve(response) {
                report.delivered += 1;
            } else {
                report.abandoned += 1;
                component_debug!(
                    ComponentId::current(),
                    "Waiter for command {} left after {:?}",
                    id,
                    entry.queued_at.elapsed()
                );
            }
        }

        report
    }

    /// Validate, decode and dispatch one raw payload
    pub fn execute_payload(&self, id: CommandId, payload: &str) -> Response {
        let json = match classify(payload) {
            Inbound::Ping => return Response::pong(),
            Inbound::Malformed(reason) => {
                return Response::from_error(&BridgeError::malformed(reason))
            }
            Inbound::Json(json) => json,
        };

        if !json.starts_with('{') {
            return Response::from_error(&BridgeError::malformed(
                "invalid command format: expected a JSON object",
            ));
        }

        let request: CommandRequest = match serde_json::from_str(json) {
            Ok(request) => request,
            Err(e) => {
                return Response::from_error(&BridgeError::malformed(format!(
                    "invalid command format: {e}"
                )))
                .with_context("received", Value::String(truncate_chars(json, 100)))
            }
        };

        if request.command_type.trim().is_empty() {
            return Response::from_error(&BridgeError::malformed("command type cannot be empty"));
        }

        self.execute(Command::from_request(id, request))
    }

    /// Run a decoded command through the policy and dispatcher
    pub fn execute(&self, command: Command) -> Response {
        if let Err(err) = self.policy.check(&command.command_type, &command.params) {
            component_warn!(ComponentId::current(), "🚫 {}", err);
            return Self::dispatch_failure(&command, err);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatcher.dispatch(&command.command_type, &command.params)
        }));

        match outcome {
            Ok(Ok(result)) => Response::success(result),
            Ok(Err(err)) => Self::dispatch_failure(&command, err),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                component_warn!(
                    ComponentId::current(),
                    "💥 Handler for '{}' panicked: {}",
                    command.command_type,
                    message
                );
                Self::dispatch_failure(&command, DispatchError::Failed(message))
            }
        }
    }

    fn dispatch_failure(command: &Command, err: DispatchError) -> Response {
        let bridge_err = match err {
            DispatchError::UnknownCommand(command_type) => {
                BridgeError::UnknownCommandType { command_type }
            }
            other => BridgeError::DispatchException {
                command_type: command.command_type.clone(),
                message: other.to_string(),
            },
        };

        Response::from_error(&bridge_err)
            .with_context("command_type", Value::String(command.command_type.clone()))
            .with_context("params_summary", Value::Object(summarize_params(&command.params)))
    }
}

/// Each parameter rendered as a short string prefix
pub fn summarize_params(params: &Params) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), Value::String(truncate_chars(&rendered, PARAM_SUMMARY_CHARS)))
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
