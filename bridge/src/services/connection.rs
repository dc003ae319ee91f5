//! Per-connection request handling
//!
//! Each read is treated as one complete request. `ping` and malformed
//! input are answered inline; JSON goes through the pending table and
//! waits for the host tick or the command timeout, whichever comes first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};

use shared::{component_debug, component_warn, truncate_chars, ComponentId};

use crate::core::input::{classify, decode_request, Inbound};
use crate::core::pending::PendingTable;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{CommandId, Response};

/// Longest payload prefix echoed back in a timeout response
const TIMEOUT_ECHO_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub command_timeout: Duration,
    pub read_buffer_size: usize,
}

/// Serve one client until it disconnects or the bridge shuts down
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    pending: Arc<PendingTable>,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
) -> BridgeResult<()> {
    let mut buf = vec![0u8; settings.read_buffer_size.max(1)];

    loop {
        if *shutdown.borrow() {
            break;
        }

        let read = tokio::select! {
            result = stream.read(&mut buf) => result,
            _ = shutdown.changed() => break,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                component_debug!(ComponentId::current(), "Read from {} ended: {}", peer, e);
                break;
            }
        };

        let response = respond(&buf[..n], &pending, &settings).await;
        stream.write_all(&response.to_bytes()?).await?;
    }

    component_debug!(ComponentId::current(), "🔌 Client {} disconnected", peer);
    Ok(())
}

/// Produce the response for one raw request
pub async fn respond(bytes: &[u8], pending: &PendingTable, settings: &ConnectionSettings) -> Response {
    let text = match decode_request(bytes) {
        Ok(text) => text,
        Err(e) => return Response::from_error(&e),
    };

    match classify(text) {
        Inbound::Ping => Response::pong(),
        Inbound::Malformed(reason) => Response::from_error(&BridgeError::malformed(reason)),
        Inbound::Json(json) => {
            let (id, receiver) = pending.insert(json.to_string());
            await_completion(pending, id, receiver, json, settings.command_timeout).await
        }
    }
}

/// Wait for the drain step to resolve `id`, or time out and claim the entry back
pub async fn await_completion(
    pending: &PendingTable,
    id: CommandId,
    receiver: oneshot::Receiver<Response>,
    payload: &str,
    timeout: Duration,
) -> Response {
    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(response)) => response,
        Ok(Err(_)) => Response::from_error(&BridgeError::NotRunning),
        Err(_) => {
            // Whoever removes the entry first owns it. If the drain step
            // already took it, its late delivery is dropped with the receiver.
            let reclaimed = pending.remove(&id).is_some();
            component_warn!(
                ComponentId::current(),
                "⏰ Command {} timed out after {:?} (reclaimed: {})",
                id,
                timeout,
                reclaimed
            );
            Response::from_error(&BridgeError::CommandTimeout { timeout })
                .with_context("command", Value::String(truncate_chars(payload, TIMEOUT_ECHO_CHARS)))
        }
    }
}
