//! Test helpers for supervisor integration tests
//!
//! Workers are small `sh` scripts written into a temp directory.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shared::{PortRange, StartupProbe, SupervisorConfig};
use supervisor::{PortAllocator, ProcessSupervisor, ServerStatus};

/// Worker that stays up until signalled
pub const SLEEPER: &str = "exec sleep 30\n";

/// Worker that records the ports it was given, then stays up
pub const PORT_RECORDER: &str =
    "echo \"$HOSTBRIDGE_PRIMARY_PORT $HOSTBRIDGE_SECONDARY_PORT\" > ports.txt\nexec sleep 30\n";

/// Worker that ignores SIGTERM
pub const STUBBORN: &str = "trap '' TERM\nwhile true; do sleep 0.1; done\n";

pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// Config running `sh <script>` in `dir`, with fast timeouts and the
/// process startup probe
pub fn worker_config(dir: &Path, body: &str) -> SupervisorConfig {
    let script = write_script(dir, "worker.sh", body);
    let primary_port = free_port();
    let secondary_port = loop {
        let port = free_port();
        if port != primary_port {
            break port;
        }
    };

    SupervisorConfig {
        executable: PathBuf::from("sh"),
        script_path: script,
        working_dir: Some(dir.to_path_buf()),
        primary_port,
        secondary_port,
        port_range: PortRange::new(21000, 21999).unwrap(),
        startup_timeout: Duration::from_secs(5),
        startup_probe: StartupProbe::Process,
        shutdown_timeout: Duration::from_secs(2),
        restart_delay: Duration::from_millis(10),
        health_connect_timeout: Duration::from_millis(200),
        ..SupervisorConfig::default()
    }
}

pub fn supervisor_for(config: SupervisorConfig) -> (Arc<ProcessSupervisor>, Arc<PortAllocator>) {
    let allocator = Arc::new(PortAllocator::new(config.host.clone(), config.port_range));
    let supervisor = Arc::new(ProcessSupervisor::new(config, Arc::clone(&allocator)));
    (supervisor, allocator)
}

/// Poll until the supervisor reaches `expected` or `limit` passes
pub async fn wait_for_status(supervisor: &ProcessSupervisor, expected: ServerStatus, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if supervisor.status().await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    supervisor.status().await == expected
}
