//! Main entry point for the worker supervisor daemon
//!
//! Starts the worker, keeps it under the health monitor, and shuts both
//! down on Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;

use shared::{component_info, logging, ComponentId, StartupProbe, SupervisorConfig};
use supervisor::{HealthMonitor, PortAllocator, ProcessSupervisor, WorkerControl};

/// Worker process supervisor
#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Launches the worker process, allocates its ports, and restarts it when unhealthy")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Worker executable (overrides HOSTBRIDGE_WORKER_EXECUTABLE)
    #[arg(long)]
    pub executable: Option<PathBuf>,

    /// Worker entry script (overrides HOSTBRIDGE_WORKER_SCRIPT)
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Startup readiness probe: port or process (overrides HOSTBRIDGE_STARTUP_PROBE)
    #[arg(long)]
    pub startup_probe: Option<StartupProbe>,

    /// Health check interval in seconds (overrides HOSTBRIDGE_HEALTH_INTERVAL_SECS)
    #[arg(long)]
    pub health_interval: Option<u64>,

    /// Status file path (overrides HOSTBRIDGE_STATUS_FILE)
    #[arg(long)]
    pub status_file: Option<PathBuf>,

    /// Print the port usage report as JSON and exit
    #[arg(long)]
    pub port_report: bool,
}

fn build_config(args: &Args) -> anyhow::Result<SupervisorConfig> {
    let mut config = SupervisorConfig::from_env()?;
    if let Some(executable) = &args.executable {
        config.executable = executable.clone();
    }
    if let Some(script) = &args.script {
        config.script_path = script.clone();
    }
    if let Some(probe) = args.startup_probe {
        config.startup_probe = probe;
    }
    if let Some(secs) = args.health_interval {
        if secs == 0 {
            anyhow::bail!("--health-interval must be at least 1 second");
        }
        config.health_interval = Duration::from_secs(secs);
    }
    if let Some(path) = &args.status_file {
        config.status_file = Some(path.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ComponentId::init_supervisor();
    logging::init_tracing(Some(&args.log_level));

    let config = build_config(&args)?;
    let allocator = Arc::new(PortAllocator::new(config.host.clone(), config.port_range));

    if args.port_report {
        println!("{}", serde_json::to_string_pretty(&allocator.usage_report())?);
        return Ok(());
    }

    logging::log_startup(ComponentId::current(), "worker supervisor");

    let supervisor = Arc::new(ProcessSupervisor::new(config.clone(), Arc::clone(&allocator)));
    if let Err(e) = supervisor.start().await {
        // The monitor keeps retrying through restarts
        logging::log_error(ComponentId::current(), "Initial worker start", &e);
    }

    let worker: Arc<dyn WorkerControl> = supervisor.clone();
    let monitor = Arc::new(HealthMonitor::new(config, worker, Arc::clone(&allocator)));
    monitor.start();

    match signal::ctrl_c().await {
        Ok(()) => logging::log_shutdown(ComponentId::current(), "Received Ctrl+C signal"),
        Err(err) => logging::log_error(ComponentId::current(), "Signal handling", &err),
    }

    monitor.stop_and_wait().await;
    supervisor.stop().await?;

    if let Some(record) = monitor.last_record() {
        component_info!(
            ComponentId::current(),
            "Last health check at {}: healthy={}",
            record.checked_at,
            record.healthy
        );
    }
    logging::log_success(ComponentId::current(), "Supervisor stopped gracefully");
    Ok(())
}
