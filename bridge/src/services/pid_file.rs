//! PID file for crash-recovery detection
//!
//! The bridge records its own process id on start and removes it on a
//! clean stop. Finding someone else's pid on the next start means the
//! previous instance never shut down cleanly.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use shared::{component_debug, component_warn, ComponentId};

use crate::error::BridgeResult;

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded pid, if any
    pub fn read(&self) -> BridgeResult<Option<u32>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.trim().parse().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the current pid, returning a stale pid left by a previous run
    pub fn acquire(&self) -> BridgeResult<Option<u32>> {
        let current = std::process::id();
        let previous = self.read()?.filter(|pid| *pid != current);

        if let Some(pid) = previous {
            component_warn!(
                ComponentId::current(),
                "♻️ Found PID file from process {} at {}; previous bridge did not shut down cleanly",
                pid,
                self.path.display()
            );
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, current.to_string())?;
        component_debug!(ComponentId::current(), "📝 Wrote PID {} to {}", current, self.path.display());

        Ok(previous)
    }

    /// Remove the file if it still records this process. Idempotent.
    pub fn release(&self) -> BridgeResult<()> {
        match self.read()? {
            Some(pid) if pid == std::process::id() => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            _ => Ok(()),
        }
    }
}
