//! Wire types for the command bridge protocol

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::BridgeError;

/// Parameter bag carried by a command
pub type Params = Map<String, Value>;

/// Literal request answered without touching the pending table
pub const PING_LITERAL: &str = "ping";

/// Unique identifier for a queued command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound request body: `{"type": "...", "params": {...}}`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default, deserialize_with = "params_or_empty")]
    pub params: Params,
}

/// `"params": null` is treated the same as a missing bag
fn params_or_empty<'de, D>(deserializer: D) -> Result<Params, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Params>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decoded command ready for dispatch
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub command_type: String,
    pub params: Params,
}

impl Command {
    pub fn from_request(id: CommandId, request: CommandRequest) -> Self {
        Self {
            id,
            command_type: request.command_type,
            params: request.params,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Outbound reply written back to the originating connection
///
/// Success: `{"status":"success","result":...}`.
/// Error: `{"status":"error","error":"...", <diagnostic fields>}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

impl Response {
    pub fn success(result: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            result: Some(result),
            error: None,
            context: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error: Some(message.into()),
            context: Map::new(),
        }
    }

    /// Error response tagged with the error's code
    pub fn from_error(err: &BridgeError) -> Self {
        Self::error(err.to_string()).with_context("code", Value::String(err.code().to_string()))
    }

    /// Fixed reply to the `ping` literal
    pub fn pong() -> Self {
        Self::success(json!({ "message": "pong" }))
    }

    /// Attach a diagnostic field
    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
