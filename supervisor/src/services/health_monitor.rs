//! Periodic worker health checks with restart on repeated failure
//!
//! Each tick queries the worker and probes both of its ports. Memory and
//! uptime thresholds only add warnings to the record. After
//! `max_consecutive_failures` unhealthy ticks in a row the worker is
//! restarted once and the counter starts over.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use shared::{component_debug, component_error, component_info, component_warn, logging, ComponentId, SupervisorConfig};

use crate::core::FailureTracker;
use crate::error::SupervisorError;
use crate::services::port_allocator::PortAllocator;
use crate::services::process_supervisor::probe_port;
use crate::services::status_file::{StatusFile, StatusSnapshot};
use crate::traits::WorkerControl;
use crate::types::{HealthRecord, ServerStatus, PRIMARY_SERVICE, SECONDARY_SERVICE};

struct MonitorState {
    tracker: FailureTracker,
    last_record: Option<HealthRecord>,
}

/// The periodic loop and the signal that ends it
struct MonitorTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct HealthMonitor {
    config: SupervisorConfig,
    worker: Arc<dyn WorkerControl>,
    allocator: Arc<PortAllocator>,
    status_file: Option<StatusFile>,
    state: Mutex<MonitorState>,
    /// Serializes checks so a manual check never interleaves with a tick
    check_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    pub fn new(config: SupervisorConfig, worker: Arc<dyn WorkerControl>, allocator: Arc<PortAllocator>) -> Self {
        let status_file = config.status_file.clone().map(StatusFile::new);
        let tracker = FailureTracker::new(config.max_consecutive_failures);

        Self {
            config,
            worker,
            allocator,
            status_file,
            state: Mutex::new(MonitorState {
                tracker,
                last_record: None,
            }),
            check_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task(&self) -> MutexGuard<'_, Option<MonitorTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin periodic checks. Returns `false` if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let monitor = Arc::clone(self);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });
        *task = Some(MonitorTask { shutdown_tx, handle });
        component_info!(
            ComponentId::current(),
            "💓 Health monitor started (every {:?}, restart after {} failures)",
            self.config.health_interval,
            self.state().tracker.threshold()
        );
        true
    }

    /// Stop periodic checks at the next tick boundary. Returns `false` if
    /// not running.
    ///
    /// A check already in flight, including any restart it triggered, runs
    /// to completion in the background.
    pub fn stop(&self) -> bool {
        self.signal_stop().is_some()
    }

    /// Like `stop`, but also waits for an in-flight check to finish
    pub async fn stop_and_wait(&self) -> bool {
        let Some(handle) = self.signal_stop() else {
            return false;
        };
        if let Err(e) = handle.await {
            logging::log_error(ComponentId::current(), "Health monitor task", &e);
        }
        true
    }

    fn signal_stop(&self) -> Option<JoinHandle<()>> {
        let task = self.task().take()?;
        // The loop may already be gone; nothing left to tell it then
        let _ = task.shutdown_tx.send(true);
        component_info!(ComponentId::current(), "Health monitor stopped");
        Some(task.handle)
    }

    pub fn is_running(&self) -> bool {
        self.task().as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    pub fn last_record(&self) -> Option<HealthRecord> {
        self.state().last_record.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().tracker.consecutive()
    }

    pub fn status_file(&self) -> Option<&StatusFile> {
        self.status_file.as_ref()
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.config.health_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }
            // Never raced against shutdown; a check always completes
            self.check_now().await;
            if *shutdown_rx.borrow() {
                break;
            }
        }
        component_debug!(ComponentId::current(), "Health monitor loop exited");
    }

    /// Run one health check immediately
    pub async fn check_now(&self) -> HealthRecord {
        let _serial = self.check_lock.lock().await;

        let (healthy, details) = self.probe().await;
        let (record, restart) = {
            let mut state = self.state();
            let (consecutive_failures, restart) = if healthy {
                state.tracker.record_success();
                (0, false)
            } else {
                state.tracker.record_failure()
            };

            let record = HealthRecord {
                checked_at: Utc::now(),
                healthy,
                consecutive_failures,
                details,
            };
            state.last_record = Some(record.clone());
            (record, restart)
        };

        if healthy {
            component_debug!(ComponentId::current(), "💚 Worker healthy");
        } else {
            let failure = SupervisorError::HealthCheckFailure {
                consecutive_failures: record.consecutive_failures,
                detail: record.details.join("; "),
            };
            component_warn!(ComponentId::current(), "💔 {}", failure);
        }

        if restart {
            component_error!(
                ComponentId::current(),
                "🚑 {} consecutive health failures, restarting worker",
                record.consecutive_failures
            );
            match self.worker.restart().await {
                Ok(()) => component_info!(ComponentId::current(), "Worker restarted after health failures"),
                Err(e) => logging::log_error(ComponentId::current(), "Restart after health failures", &e),
            }
        }

        self.write_status(&record).await;
        record
    }

    async fn probe(&self) -> (bool, Vec<String>) {
        let mut details = Vec::new();

        let info = match self.worker.query().await {
            None => {
                details.push("no worker process".to_string());
                return (false, details);
            }
            Some(info) if info.exited => {
                details.push(format!("worker {} exited (code {:?})", info.pid, info.exit_code));
                return (false, details);
            }
            Some(info) => info,
        };

        let mut healthy = true;
        for service in [PRIMARY_SERVICE, SECONDARY_SERVICE] {
            match self.allocator.get(service) {
                None => {
                    healthy = false;
                    details.push(format!("no {service} port allocated"));
                }
                Some(port) => {
                    if !probe_port(&self.config.host, port, self.config.health_connect_timeout).await {
                        healthy = false;
                        details.push(format!("{service} port {port} not accepting connections"));
                    }
                }
            }
        }

        if let Some(memory_mb) = info.memory_mb() {
            if memory_mb > self.config.memory_warning_mb {
                details.push(format!(
                    "warning: memory {memory_mb} MB above {} MB",
                    self.config.memory_warning_mb
                ));
            }
        }
        if info.uptime_secs > self.config.uptime_warning.as_secs() {
            details.push(format!(
                "warning: uptime {}s above {}s, consider a restart",
                info.uptime_secs,
                self.config.uptime_warning.as_secs()
            ));
        }

        (healthy, details)
    }

    async fn write_status(&self, record: &HealthRecord) {
        let Some(status_file) = &self.status_file else {
            return;
        };

        let snapshot = StatusSnapshot {
            running: self.worker.status().await == ServerStatus::Running,
            primary_port: self.allocator.get(PRIMARY_SERVICE),
            secondary_port: self.allocator.get(SECONDARY_SERVICE),
            healthy: record.healthy,
            last_check: Some(record.checked_at),
            error: self.worker.last_error().await,
        };
        if let Err(e) = status_file.write(&snapshot).await {
            logging::log_error(ComponentId::current(), "Writing status file", &e);
        }
    }
}
