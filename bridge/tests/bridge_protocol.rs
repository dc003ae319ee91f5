//! End-to-end tests of the bridge wire protocol
//!
//! Real TCP clients against a running bridge, with the host tick
//! simulated by a background drain loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use bridge::traits::MockCommandDispatcher;
use bridge::{CommandRegistry, DispatchError};

mod common;
use common::{spawn_host_tick, start_bridge, test_config, TestClient};

fn registry() -> CommandRegistry {
    CommandRegistry::new()
        .with("echo", |params| Ok(Value::Object(params.clone())))
        .with("scene.get_hierarchy", |_| Ok(json!({"roots": ["Main Camera", "Light"]})))
        .with("asset.import", |_| Err(DispatchError::failed("file not found")))
}

#[tokio::test]
async fn test_registered_command_returns_handler_result() {
    let (bridge, addr) = start_bridge(test_config(), Arc::new(registry())).await;
    let tick = spawn_host_tick(Arc::clone(&bridge));

    let mut client = TestClient::connect(addr).await;
    let response = client
        .send(r#"{"type":"scene.get_hierarchy","params":{}}"#)
        .await;

    assert_eq!(
        response,
        json!({"status": "success", "result": {"roots": ["Main Camera", "Light"]}})
    );

    tick.abort();
    bridge.stop();
}

#[tokio::test]
async fn test_ping_is_immediate_and_unqueued() {
    let (bridge, addr) = start_bridge(test_config(), Arc::new(registry())).await;

    // No host tick: ping must not depend on draining
    let mut client = TestClient::connect(addr).await;
    let started = Instant::now();
    let response = client.send("ping").await;

    assert_eq!(response, json!({"status": "success", "result": {"message": "pong"}}));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bridge.pending_count(), 0);

    bridge.stop();
}

#[tokio::test]
async fn test_invalid_input_never_reaches_dispatcher() {
    let mut dispatcher = MockCommandDispatcher::new();
    dispatcher.expect_dispatch().times(0);

    let (bridge, addr) = start_bridge(test_config(), Arc::new(dispatcher)).await;
    let tick = spawn_host_tick(Arc::clone(&bridge));
    let mut client = TestClient::connect(addr).await;

    for payload in ["hello there", "{\"type\":", "true", "3.14"] {
        let response = client.send(payload).await;
        assert_eq!(response["status"], "error", "payload {payload:?}");
        assert_eq!(response["code"], "malformed_input");
    }

    tick.abort();
    bridge.stop();
}

#[tokio::test]
async fn test_unknown_and_failing_commands_are_structured_errors() {
    let (bridge, addr) = start_bridge(test_config(), Arc::new(registry())).await;
    let tick = spawn_host_tick(Arc::clone(&bridge));
    let mut client = TestClient::connect(addr).await;

    let unknown = client.send(r#"{"type":"does.not.exist","params":{}}"#).await;
    assert_eq!(unknown["status"], "error");
    assert_eq!(unknown["code"], "unknown_command_type");
    assert_eq!(unknown["command_type"], "does.not.exist");

    let failing = client
        .send(r#"{"type":"asset.import","params":{"path":"Assets/Models/Character.fbx"}}"#)
        .await;
    assert_eq!(failing["status"], "error");
    assert!(failing["error"].as_str().unwrap().contains("file not found"));
    assert_eq!(failing["params_summary"]["path"], "Assets/Models/Charac...");

    // Connection still serves requests after errors
    let ok = client.send(r#"{"type":"echo","params":{"n":3}}"#).await;
    assert_eq!(ok["result"], json!({"n": 3}));

    tick.abort();
    bridge.stop();
}

#[tokio::test]
async fn test_undrained_command_times_out_once() {
    let config = shared::BridgeConfig {
        command_timeout: Duration::from_millis(200),
        ..test_config()
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let registry = CommandRegistry::new().with("echo", move |params| {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Object(params.clone()))
    });

    let (bridge, addr) = start_bridge(config, Arc::new(registry)).await;
    let mut client = TestClient::connect(addr).await;

    let response = client.send(r#"{"type":"echo","params":{}}"#).await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["code"], "command_timeout");
    assert_eq!(response["command"], r#"{"type":"echo","params":{}}"#);
    assert_eq!(bridge.pending_count(), 0);

    // The host finally ticks: nothing left to run or deliver
    let report = bridge.drain();
    assert_eq!(report.processed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    bridge.stop();
}

#[tokio::test]
async fn test_concurrent_clients_each_get_their_own_reply() {
    let (bridge, addr) = start_bridge(test_config(), Arc::new(registry())).await;
    let tick = spawn_host_tick(Arc::clone(&bridge));

    let mut tasks = Vec::new();
    for i in 0..8 {
        tasks.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await;
            let response = client
                .send(&format!(r#"{{"type":"echo","params":{{"client":{i}}}}}"#))
                .await;
            (i, response)
        }));
    }

    for task in tasks {
        let (i, response) = task.await.unwrap();
        assert_eq!(response["result"], json!({"client": i}));
    }

    tick.abort();
    bridge.stop();
}

#[tokio::test]
async fn test_stop_closes_active_connections() {
    let (bridge, addr) = start_bridge(test_config(), Arc::new(registry())).await;
    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("ping").await["status"], "success");

    bridge.stop();
    assert!(client.is_closed().await);
    assert_eq!(bridge.connection_count(), 0);

    // Second stop is a no-op
    bridge.stop();
    assert!(!bridge.is_running());
}

#[tokio::test]
async fn test_whitelist_blocks_unapproved_actions() {
    let config = shared::BridgeConfig {
        auto_approve_commands: false,
        whitelisted_actions: vec!["echo".to_string()],
        ..test_config()
    };
    let (bridge, addr) = start_bridge(config, Arc::new(registry())).await;
    let tick = spawn_host_tick(Arc::clone(&bridge));
    let mut client = TestClient::connect(addr).await;

    let allowed = client.send(r#"{"type":"echo","params":{"a":"b"}}"#).await;
    assert_eq!(allowed["status"], "success");

    let blocked = client.send(r#"{"type":"scene.get_hierarchy"}"#).await;
    assert_eq!(blocked["status"], "error");
    assert!(blocked["error"].as_str().unwrap().contains("scene.get_hierarchy"));

    tick.abort();
    bridge.stop();
}

#[tokio::test]
async fn test_pid_file_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let pid_path = dir.path().join("bridge.pid");
    let config = shared::BridgeConfig {
        pid_file: Some(pid_path.clone()),
        ..test_config()
    };

    let (bridge, _addr) = start_bridge(config, Arc::new(registry())).await;
    let recorded = std::fs::read_to_string(&pid_path).unwrap();
    assert_eq!(recorded.trim(), std::process::id().to_string());

    bridge.stop();
    assert!(!pid_path.exists());
}
