//! Worker stdout/stderr handling
//!
//! Worker output is always piped and re-emitted as tracing events under the
//! `worker` target, so it lands in the supervisor's log with a pid field.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Pipe the worker's output and detach its stdin
pub fn configure_worker_stdio(cmd: &mut Command) {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());
}

/// Spawn one forwarding task per piped stream
///
/// The tasks end on EOF, which also keeps the worker from blocking on a
/// full pipe.
pub fn spawn_output_forwarders(child: &mut Child, pid: u32) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, pid, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, pid, true));
    }
}

async fn forward_lines<R>(stream: R, pid: u32, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(target: "worker", pid, stream = "stderr", "{}", line);
        } else {
            tracing::info!(target: "worker", pid, stream = "stdout", "{}", line);
        }
    }
}
