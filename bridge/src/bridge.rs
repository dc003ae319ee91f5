//! Bridge lifecycle: listener, accept loop, connection tracking, drain
//!
//! `BridgeContext` owns everything the bridge shares between the network
//! side and the host tick. The host calls `drain()` from its own loop;
//! nothing here assumes how often that happens.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use shared::{component_debug, component_info, component_warn, logging, BridgeConfig, ComponentId};

use crate::core::{ActionPolicy, CommandExecutor, DrainReport, PendingTable};
use crate::error::{BridgeError, BridgeResult};
use crate::services::connection::{handle_connection, ConnectionSettings};
use crate::services::PidFile;
use crate::traits::CommandDispatcher;

/// Active connection tasks, tracked only so shutdown can close them
#[derive(Debug, Default)]
struct ConnectionSet {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, AbortHandle>>,
}

impl ConnectionSet {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Abort every tracked task, dropping (and so closing) its socket
    fn close_all(&self) -> usize {
        let tasks = std::mem::take(&mut *self.lock());
        let count = tasks.len();
        for handle in tasks.into_values() {
            handle.abort();
        }
        count
    }
}

struct RunningBridge {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

pub struct BridgeContext {
    config: BridgeConfig,
    pending: Arc<PendingTable>,
    executor: CommandExecutor,
    connections: Arc<ConnectionSet>,
    running: Mutex<Option<RunningBridge>>,
    pid_file: Option<PidFile>,
}

impl BridgeContext {
    pub fn new(config: BridgeConfig, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        let policy = ActionPolicy::from_config(&config);
        let pid_file = config.pid_file.clone().map(PidFile::new);

        Self {
            config,
            pending: Arc::new(PendingTable::new()),
            executor: CommandExecutor::new(dispatcher, policy),
            connections: Arc::new(ConnectionSet::default()),
            running: Mutex::new(None),
            pid_file,
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningBridge>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind the loopback listener and start accepting connections
    ///
    /// Returns the bound address. Calling `start` on a running bridge is a
    /// no-op that returns the existing address.
    pub async fn start(&self) -> BridgeResult<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| BridgeError::BindError { addr: bind_addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        let mut running = self.running();
        if let Some(existing) = running.as_ref() {
            // Lost a concurrent start; our listener is dropped here
            return Ok(existing.local_addr);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = ConnectionSettings {
            command_timeout: self.config.command_timeout,
            read_buffer_size: self.config.read_buffer_size,
        };
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.pending),
            Arc::clone(&self.connections),
            settings,
            shutdown_rx,
        ));

        *running = Some(RunningBridge {
            local_addr,
            shutdown_tx,
            accept_task,
        });
        drop(running);

        if let Some(pid_file) = &self.pid_file {
            if let Err(e) = pid_file.acquire() {
                logging::log_error(ComponentId::current(), "Writing PID file", &e);
            }
        }

        component_info!(ComponentId::current(), "🌉 Command bridge listening on {}", local_addr);
        Ok(local_addr)
    }

    /// `start`, retried up to `max_bind_retries` extra times on bind failure
    pub async fn start_with_retry(&self) -> BridgeResult<SocketAddr> {
        let mut attempt = 0;
        loop {
            match self.start().await {
                Ok(addr) => return Ok(addr),
                Err(err @ BridgeError::BindError { .. }) if attempt < self.config.max_bind_retries => {
                    attempt += 1;
                    component_warn!(
                        ComponentId::current(),
                        "🔁 Bind attempt {} failed ({}); retrying in {:?}",
                        attempt,
                        err,
                        self.config.bind_retry_delay
                    );
                    tokio::time::sleep(self.config.bind_retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Stop accepting, close every connection, and drop queued commands
    ///
    /// Idempotent and safe to call from any exit path, including `Drop`.
    pub fn stop(&self) {
        let taken = self.running().take();
        let Some(running) = taken else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        running.accept_task.abort();
        let closed = self.connections.close_all();
        let dropped = self.pending.clear();

        if let Some(pid_file) = &self.pid_file {
            if let Err(e) = pid_file.release() {
                logging::log_error(ComponentId::current(), "Removing PID file", &e);
            }
        }

        component_info!(
            ComponentId::current(),
            "🛑 Command bridge on {} stopped ({} connections closed, {} pending dropped)",
            running.local_addr,
            closed,
            dropped
        );
    }

    /// Execute every queued command on the caller's thread
    pub fn drain(&self) -> DrainReport {
        let report = self.executor.drain(&self.pending);
        if report.processed > 0 {
            component_debug!(
                ComponentId::current(),
                "🔄 Drained {} commands ({} delivered, {} abandoned)",
                report.processed,
                report.delivered,
                report.abandoned
            );
        }
        report
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running().as_ref().map(|r| r.local_addr)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    pending: Arc<PendingTable>,
    connections: Arc<ConnectionSet>,
    settings: ConnectionSettings,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => accepted,
        };

        if *shutdown_rx.borrow() {
            break;
        }

        match accepted {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                component_debug!(ComponentId::current(), "🔗 Client connected: {}", peer);

                let id = connections.next_id.fetch_add(1, Ordering::Relaxed);
                let task_pending = Arc::clone(&pending);
                let task_connections = Arc::clone(&connections);
                let task_shutdown = shutdown_rx.clone();

                // Hold the set lock across spawn so the task cannot
                // deregister itself before it is registered
                let mut tasks = connections.lock();
                let handle = tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, peer, task_pending, settings, task_shutdown).await
                    {
                        component_debug!(ComponentId::current(), "Connection {} closed with error: {}", peer, e);
                    }
                    task_connections.remove(id);
                });
                tasks.insert(id, handle.abort_handle());
            }
            Err(e) => {
                component_warn!(ComponentId::current(), "Accept failed: {}", e);
            }
        }
    }

    component_debug!(ComponentId::current(), "Accept loop exited");
}
