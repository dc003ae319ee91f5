//! Resource sampling for a single process via sysinfo

use sysinfo::{Pid, System};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSample {
    pub memory_bytes: u64,
    pub cpu_usage_percent: f32,
}

/// Sample `pid`, or `None` if the OS no longer knows it
///
/// CPU usage needs two refreshes to be meaningful, so a one-shot sample
/// usually reports 0.
pub fn sample(pid: u32) -> Option<ProcessSample> {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return None;
    }

    let process = system.process(pid)?;
    Some(ProcessSample {
        memory_bytes: process.memory(),
        cpu_usage_percent: process.cpu_usage(),
    })
}

/// `sample` off the async runtime's worker threads
pub async fn sample_async(pid: u32) -> Option<ProcessSample> {
    tokio::task::spawn_blocking(move || sample(pid)).await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_current_process() {
        let sample = sample(std::process::id()).unwrap();
        assert!(sample.memory_bytes > 0);
    }

    #[test]
    fn test_sample_async_off_runtime_threads() {
        let sample = tokio_test::block_on(sample_async(std::process::id()));
        assert!(sample.is_some());
    }

    #[test]
    fn test_sample_missing_process() {
        assert!(sample(u32::MAX - 1).is_none());
    }
}
