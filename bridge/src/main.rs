//! Main entry point for the bridge demo host
//!
//! Stands in for a real single-threaded host: registers a couple of
//! handlers, starts the bridge, and drains pending commands from a fixed
//! frame loop until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::{json, Value};
use tokio::signal;

use bridge::{BridgeContext, CommandRegistry, DispatchError};
use shared::{component_debug, logging, BridgeConfig, ComponentId};

/// Command bridge demo host
#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "Runs the command bridge inside a simulated cooperative host loop")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Listen port (overrides HOSTBRIDGE_BRIDGE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Host tick interval in milliseconds
    #[arg(long, default_value = "16")]
    pub tick_ms: u64,

    /// PID file path (overrides HOSTBRIDGE_PID_FILE)
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Per-command timeout in seconds (overrides HOSTBRIDGE_COMMAND_TIMEOUT_SECS)
    #[arg(long)]
    pub command_timeout: Option<f64>,
}

fn demo_registry() -> CommandRegistry {
    CommandRegistry::new()
        .with("echo", |params| Ok(Value::Object(params.clone())))
        .with("host.time", |_| Ok(json!({ "now": chrono::Utc::now().to_rfc3339() })))
        .with("host.fail", |params| {
            let reason = params
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("requested failure");
            Err(DispatchError::failed(reason))
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ComponentId::init_bridge();
    logging::init_tracing(Some(&args.log_level));

    let mut config = BridgeConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = args.pid_file {
        config.pid_file = Some(path);
    }
    if let Some(secs) = args.command_timeout {
        if !secs.is_finite() || secs <= 0.0 {
            anyhow::bail!("--command-timeout must be a positive number of seconds");
        }
        config.command_timeout = Duration::from_secs_f64(secs);
    }

    logging::log_startup(ComponentId::current(), "command bridge demo host");

    let bridge = BridgeContext::new(config, Arc::new(demo_registry()));
    bridge.start_with_retry().await?;

    let mut frame = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    frame.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = frame.tick() => {
                bridge.drain();
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => logging::log_shutdown(ComponentId::current(), "Received Ctrl+C signal"),
                    Err(err) => logging::log_error(ComponentId::current(), "Signal handling", &err),
                }
                break;
            }
        }
    }

    component_debug!(ComponentId::current(), "{} commands still pending at shutdown", bridge.pending_count());
    bridge.stop();
    logging::log_success(ComponentId::current(), "Bridge stopped gracefully");
    Ok(())
}
