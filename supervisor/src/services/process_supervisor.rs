//! Worker process lifecycle
//!
//! Spawns the worker with its two allocated ports in the environment,
//! waits for it to come up, and tears it down gracefully with escalation.
//! A watcher task owns the `Child` for its whole life; everything else
//! talks to it through a kill channel and observes it through an exit
//! channel.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::Instant;

use shared::{
    component_debug, component_error, component_info, component_warn, ComponentId, StartupProbe,
    SupervisorConfig,
};

use crate::core::StatusMachine;
use crate::error::{SupervisorError, SupervisorResult};
use crate::services::port_allocator::PortAllocator;
use crate::services::process_metrics;
use crate::services::process_output::{configure_worker_stdio, spawn_output_forwarders};
use crate::traits::WorkerControl;
use crate::types::{ProcessInfo, ServerStatus, WorkerPorts, PRIMARY_SERVICE, SECONDARY_SERVICE};

/// Delay between readiness probes during startup
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a worker must stay alive to count as started under the
/// process probe
const PROCESS_SETTLE_TIME: Duration = Duration::from_millis(500);

/// Wait after a forced kill before giving up on the exit notification
const FORCED_EXIT_WAIT: Duration = Duration::from_secs(5);

/// How the worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub success: bool,
}

impl From<std::process::ExitStatus> for WorkerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Supervisor-side handle to a running watcher task
struct WorkerHandle {
    pid: u32,
    started_at: DateTime<Utc>,
    /// Dropping this also kills the worker
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
}

impl WorkerHandle {
    fn exit(&self) -> Option<WorkerExit> {
        *self.exit_rx.borrow()
    }
}

#[derive(Default)]
struct SupervisorState {
    status: StatusMachine,
    /// Bumped on every start so late events from an old worker are ignored
    generation: u64,
    worker: Option<WorkerHandle>,
    last_error: Option<String>,
}

impl SupervisorState {
    fn fail(&mut self, message: String) {
        component_error!(ComponentId::current(), "❌ Worker error: {}", message);
        self.status.transition(ServerStatus::Error).ok();
        self.last_error = Some(message);
    }
}

/// Supervises a single worker process
///
/// Clones share the same worker, state and allocator.
#[derive(Clone)]
pub struct ProcessSupervisor {
    config: Arc<SupervisorConfig>,
    allocator: Arc<PortAllocator>,
    state: Arc<Mutex<SupervisorState>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig, allocator: Arc<PortAllocator>) -> Self {
        Self {
            config: Arc::new(config),
            allocator,
            state: Arc::new(Mutex::new(SupervisorState::default())),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<PortAllocator> {
        &self.allocator
    }

    pub async fn status(&self) -> ServerStatus {
        self.state.lock().await.status.current()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    /// Both ports, when both are currently allocated
    pub fn ports(&self) -> Option<WorkerPorts> {
        Some(WorkerPorts {
            primary: self.allocator.get(PRIMARY_SERVICE)?,
            secondary: self.allocator.get(SECONDARY_SERVICE)?,
        })
    }

    /// Start the worker and wait until it is ready
    ///
    /// A no-op when the worker is already starting or running. Any failure
    /// leaves the supervisor in `Error` with its ports released. The work
    /// runs on its own task, so dropping the returned future does not
    /// strand the supervisor in `Starting`.
    pub async fn start(&self) -> SupervisorResult<()> {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.start_worker().await }).await?
    }

    async fn start_worker(&self) -> SupervisorResult<()> {
        let generation = {
            let mut state = self.state.lock().await;
            let current = state.status.current();
            if matches!(current, ServerStatus::Starting | ServerStatus::Running) {
                component_debug!(ComponentId::current(), "Worker already {}, start ignored", current);
                return Ok(());
            }

            state.status.transition(ServerStatus::Starting)?;
            state.generation += 1;
            state.last_error = None;
            state.worker = None;
            state.generation
        };

        match self.launch(generation).await {
            Ok(ports) => {
                component_info!(
                    ComponentId::current(),
                    "✅ Worker running on ports {} / {}",
                    ports.primary,
                    ports.secondary
                );
                Ok(())
            }
            Err(e) => {
                self.abort_start(generation, &e).await;
                Err(e)
            }
        }
    }

    async fn launch(&self, generation: u64) -> SupervisorResult<WorkerPorts> {
        let executable = resolve_executable(&self.config.executable)?;
        let script = self.resolve_script()?;
        let ports = self.allocate_ports()?;

        let mut cmd = Command::new(&executable);
        cmd.arg(&script)
            .env(&self.config.primary_port_env, ports.primary.to_string())
            .env(&self.config.secondary_port_env, ports.secondary.to_string());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        configure_worker_stdio(&mut cmd);

        component_info!(
            ComponentId::current(),
            "🚀 Spawning worker: {} {}",
            executable.display(),
            script.display()
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn_failure(format!("{}: {}", executable.display(), e)))?;
        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::spawn_failure("worker exited before reporting a pid"))?;
        spawn_output_forwarders(&mut child, pid);

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(watch_worker(
            child,
            pid,
            generation,
            kill_rx,
            exit_tx,
            Arc::downgrade(&self.state),
            Arc::clone(&self.allocator),
        ));

        {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.status.current() != ServerStatus::Starting {
                // Stopped before the handle was stored; dropping kill_tx kills it
                return Err(self.interrupted(&state, generation));
            }
            state.worker = Some(WorkerHandle {
                pid,
                started_at: Utc::now(),
                kill_tx: Some(kill_tx),
                exit_rx: exit_rx.clone(),
            });
        }

        self.wait_until_ready(generation, ports, exit_rx).await?;

        let mut state = self.state.lock().await;
        if state.generation != generation || state.status.current() != ServerStatus::Starting {
            return Err(self.interrupted(&state, generation));
        }
        state.status.transition(ServerStatus::Running)?;
        Ok(ports)
    }

    fn allocate_ports(&self) -> SupervisorResult<WorkerPorts> {
        let primary = self.allocator.allocate(PRIMARY_SERVICE, Some(self.config.primary_port))?;
        let secondary = self
            .allocator
            .allocate(SECONDARY_SERVICE, Some(self.config.secondary_port))?;
        Ok(WorkerPorts { primary, secondary })
    }

    fn release_ports(&self) {
        self.allocator.release(PRIMARY_SERVICE);
        self.allocator.release(SECONDARY_SERVICE);
    }

    /// A stop overtook this start. The stop may have released the ports
    /// before they were allocated, so release them again unless a newer
    /// start owns them by now.
    fn interrupted(&self, state: &SupervisorState, generation: u64) -> SupervisorError {
        if state.generation == generation {
            self.release_ports();
        }
        SupervisorError::spawn_failure("startup interrupted by stop")
    }

    fn resolve_script(&self) -> SupervisorResult<PathBuf> {
        let script = match &self.config.working_dir {
            Some(dir) if self.config.script_path.is_relative() => dir.join(&self.config.script_path),
            _ => self.config.script_path.clone(),
        };
        if !script.is_file() {
            return Err(SupervisorError::spawn_failure(format!(
                "worker script not found: {}",
                script.display()
            )));
        }
        Ok(script.canonicalize()?)
    }

    async fn wait_until_ready(
        &self,
        generation: u64,
        ports: WorkerPorts,
        mut exit_rx: watch::Receiver<Option<WorkerExit>>,
    ) -> SupervisorResult<()> {
        let started = Instant::now();
        let deadline = started + self.config.startup_timeout;
        let settle = PROCESS_SETTLE_TIME.min(self.config.startup_timeout / 4);

        loop {
            let exited = *exit_rx.borrow();
            if let Some(exit) = exited {
                return Err(SupervisorError::spawn_failure(format!(
                    "worker exited during startup ({exit})"
                )));
            }

            {
                let state = self.state.lock().await;
                if state.generation != generation || state.status.current() != ServerStatus::Starting {
                    return Err(self.interrupted(&state, generation));
                }
            }

            let ready = match self.config.startup_probe {
                StartupProbe::Port => probe_port(&self.config.host, ports.primary, STARTUP_POLL_INTERVAL).await,
                StartupProbe::Process => started.elapsed() >= settle,
            };
            if ready {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(SupervisorError::ProcessStartupTimeout {
                    timeout: self.config.startup_timeout,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(STARTUP_POLL_INTERVAL) => {}
                changed = exit_rx.changed() => {
                    if changed.is_err() {
                        return Err(SupervisorError::spawn_failure("worker watcher ended during startup"));
                    }
                }
            }
        }
    }

    /// Undo a failed start, unless a stop already took over
    async fn abort_start(&self, generation: u64, error: &SupervisorError) {
        let leftover = {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.status.current() != ServerStatus::Starting {
                return;
            }
            state.fail(error.to_string());
            state.worker.take()
        };

        if let Some(handle) = leftover {
            self.force_kill(handle).await;
        }
        self.release_ports();
    }

    /// Stop the worker: graceful signal, then kill after the shutdown timeout
    ///
    /// A no-op when already stopped or stopping. From `Error` it only
    /// cleans up leftovers and leaves the status alone. Like `start`, the
    /// teardown runs on its own task and finishes even if the caller is
    /// cancelled, so `Stopping` always reaches `Stopped`.
    pub async fn stop(&self) -> SupervisorResult<()> {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.stop_worker().await }).await?
    }

    async fn stop_worker(&self) -> SupervisorResult<()> {
        let (handle, generation) = {
            let mut state = self.state.lock().await;
            match state.status.current() {
                ServerStatus::Stopped | ServerStatus::Stopping => return Ok(()),
                ServerStatus::Error => {
                    let leftover = state.worker.take();
                    drop(state);
                    if let Some(handle) = leftover {
                        self.terminate(handle).await;
                    }
                    self.release_ports();
                    return Ok(());
                }
                ServerStatus::Starting | ServerStatus::Running => {}
            }
            state.status.transition(ServerStatus::Stopping)?;
            (state.worker.take(), state.generation)
        };

        if let Some(handle) = handle {
            self.terminate(handle).await;
        }
        self.release_ports();

        let mut state = self.state.lock().await;
        if state.generation == generation && state.status.current() == ServerStatus::Stopping {
            state.status.transition(ServerStatus::Stopped)?;
        }
        component_info!(ComponentId::current(), "🛑 Worker stopped");
        Ok(())
    }

    async fn terminate(&self, mut handle: WorkerHandle) {
        if handle.exit().is_some() {
            return;
        }

        if request_graceful_exit(handle.pid) {
            component_debug!(ComponentId::current(), "📤 Sent SIGTERM to worker {}", handle.pid);
            if wait_for_exit(&mut handle.exit_rx, self.config.shutdown_timeout).await {
                return;
            }
            component_warn!(
                ComponentId::current(),
                "⏰ Worker {} ignored SIGTERM for {:?}, killing",
                handle.pid,
                self.config.shutdown_timeout
            );
        }

        self.force_kill(handle).await;
    }

    async fn force_kill(&self, mut handle: WorkerHandle) {
        if let Some(kill_tx) = handle.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        if !wait_for_exit(&mut handle.exit_rx, FORCED_EXIT_WAIT).await {
            component_error!(
                ComponentId::current(),
                "Worker {} still running {:?} after kill",
                handle.pid,
                FORCED_EXIT_WAIT
            );
        }
    }

    /// Stop, wait `restart_delay`, then start
    pub async fn restart(&self) -> SupervisorResult<()> {
        component_info!(ComponentId::current(), "🔄 Restarting worker");
        if let Err(e) = self.stop().await {
            component_warn!(ComponentId::current(), "Stop during restart failed: {}", e);
        }
        tokio::time::sleep(self.config.restart_delay).await;
        self.start().await
    }

    /// Snapshot of the current worker, `None` when there is none
    pub async fn query(&self) -> Option<ProcessInfo> {
        let (pid, started_at, exit) = {
            let state = self.state.lock().await;
            let worker = state.worker.as_ref()?;
            (worker.pid, worker.started_at, worker.exit())
        };

        let sample = match exit {
            None => process_metrics::sample_async(pid).await,
            Some(_) => None,
        };
        let uptime_secs = u64::try_from((Utc::now() - started_at).num_seconds()).unwrap_or(0);

        Some(ProcessInfo {
            pid,
            started_at,
            uptime_secs,
            memory_bytes: sample.map(|s| s.memory_bytes),
            cpu_usage_percent: sample.map(|s| s.cpu_usage_percent),
            exited: exit.is_some(),
            exit_code: exit.and_then(|e| e.code),
        })
    }
}

#[async_trait]
impl WorkerControl for ProcessSupervisor {
    async fn status(&self) -> ServerStatus {
        ProcessSupervisor::status(self).await
    }

    async fn query(&self) -> Option<ProcessInfo> {
        ProcessSupervisor::query(self).await
    }

    async fn restart(&self) -> SupervisorResult<()> {
        ProcessSupervisor::restart(self).await
    }

    async fn last_error(&self) -> Option<String> {
        ProcessSupervisor::last_error(self).await
    }
}

/// Owns the child until it exits, then reports how
async fn watch_worker(
    mut child: Child,
    pid: u32,
    generation: u64,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    state: Weak<Mutex<SupervisorState>>,
    allocator: Arc<PortAllocator>,
) {
    let waited = tokio::select! {
        waited = child.wait() => waited,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                component_warn!(ComponentId::current(), "Failed to kill worker {}: {}", pid, e);
            }
            child.wait().await
        }
    };

    let exit = match waited {
        Ok(status) => WorkerExit::from(status),
        Err(e) => {
            component_warn!(ComponentId::current(), "Failed to reap worker {}: {}", pid, e);
            WorkerExit { code: None, success: false }
        }
    };
    exit_tx.send_replace(Some(exit));
    component_debug!(ComponentId::current(), "Worker {} exited ({})", pid, exit);

    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock().await;
    if state.generation != generation || state.status.current() != ServerStatus::Running {
        return;
    }

    state.fail(format!("worker (pid {pid}) exited unexpectedly: {exit}"));
    drop(state);
    allocator.release(PRIMARY_SERVICE);
    allocator.release(SECONDARY_SERVICE);
}

async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<WorkerExit>>, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, exit_rx.wait_for(Option::is_some)).await,
        Ok(Ok(_))
    )
}

/// Whether `host:port` accepts a TCP connection within `limit`
pub(crate) async fn probe_port(host: &str, port: u16, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(unix)]
fn request_graceful_exit(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(raw) => kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_pid: u32) -> bool {
    false
}

/// Resolve the worker executable to a path that exists
///
/// Bare names are looked up on `PATH`; anything with a directory part is
/// taken as a path.
pub fn resolve_executable(executable: &Path) -> SupervisorResult<PathBuf> {
    if executable.components().count() > 1 || executable.is_absolute() {
        if executable.is_file() {
            return Ok(executable.canonicalize()?);
        }
        return Err(SupervisorError::spawn_failure(format!(
            "worker executable not found: {}",
            executable.display()
        )));
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&search_path)
        .flat_map(|dir| executable_candidates(&dir, executable))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            SupervisorError::spawn_failure(format!(
                "worker executable '{}' not found on PATH",
                executable.display()
            ))
        })
}

#[cfg(windows)]
fn executable_candidates(dir: &Path, executable: &Path) -> Vec<PathBuf> {
    vec![dir.join(executable), dir.join(executable).with_extension("exe")]
}

#[cfg(not(windows))]
fn executable_candidates(dir: &Path, executable: &Path) -> Vec<PathBuf> {
    vec![dir.join(executable)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_resolve_executable_on_path() {
        let resolved = resolve_executable(Path::new("sh")).unwrap();
        assert!(resolved.is_file());
    }

    #[test]
    fn test_resolve_missing_executable() {
        let err = resolve_executable(Path::new("definitely-not-a-real-binary-4821")).unwrap_err();
        assert!(err.to_string().contains("not found on PATH"));

        let err = resolve_executable(Path::new("/no/such/dir/python3")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_worker_exit_display() {
        assert_eq!(WorkerExit { code: Some(2), success: false }.to_string(), "exit code 2");
        assert_eq!(WorkerExit { code: None, success: false }.to_string(), "terminated by signal");
    }
}
