//! Test helpers for bridge integration tests
//!
//! A tiny TCP client and a simulated host tick that drains the bridge.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use bridge::{BridgeContext, CommandDispatcher};
use shared::BridgeConfig;

/// Receive timeout for test clients
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        port: 0,
        command_timeout: Duration::from_secs(5),
        ..BridgeConfig::default()
    }
}

pub async fn start_bridge(
    config: BridgeConfig,
    dispatcher: Arc<dyn CommandDispatcher>,
) -> (Arc<BridgeContext>, SocketAddr) {
    let bridge = Arc::new(BridgeContext::new(config, dispatcher));
    let addr = bridge.start().await.expect("bridge should start");
    (bridge, addr)
}

/// Simulated host loop calling `drain` every few milliseconds
pub fn spawn_host_tick(bridge: Arc<BridgeContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut frame = tokio::time::interval(Duration::from_millis(5));
        loop {
            frame.tick().await;
            bridge.drain();
        }
    })
}

pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to bridge");
        Self { stream }
    }

    pub async fn send_raw(&mut self, payload: &[u8]) -> Value {
        self.stream.write_all(payload).await.expect("write request");
        self.read_response().await
    }

    pub async fn send(&mut self, payload: &str) -> Value {
        self.send_raw(payload.as_bytes()).await
    }

    pub async fn read_response(&mut self) -> Value {
        let mut buf = vec![0u8; 64 * 1024];
        let n = tokio::time::timeout(RECV_TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("response within receive timeout")
            .expect("read response");
        assert!(n > 0, "bridge closed the connection");
        serde_json::from_slice(&buf[..n]).expect("response is JSON")
    }

    /// True when the server side has closed the connection
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 16];
        match tokio::time::timeout(RECV_TIMEOUT, self.stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            _ => false,
        }
    }
}
