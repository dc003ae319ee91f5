//! Configuration for the command bridge and the worker supervisor
//!
//! Defaults mirror the stock deployment: the host listens on 6400, the
//! worker's second service on 6500, and the allocator scans 6400..=6599.
//! `from_env` layers `.env` and `HOSTBRIDGE_*` variables on top.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

/// Default `type.action` keys approved when auto-approval is disabled
pub const DEFAULT_WHITELISTED_ACTIONS: &[&str] = &[
    "manage_editor.get_state",
    "manage_editor.get_compilation_status",
    "manage_editor.refresh_assets",
    "manage_editor.save_assets",
    "manage_editor.recompile_scripts",
    "manage_editor.full_refresh",
    "manage_editor.get_tags",
    "manage_editor.get_layers",
    "manage_editor.add_tag",
    "manage_editor.remove_tag",
    "manage_editor.add_layer",
    "manage_editor.remove_layer",
    "manage_editor.play",
    "manage_editor.pause",
    "manage_editor.stop",
    "manage_scene.get_hierarchy",
    "manage_scene.load",
    "manage_scene.save",
    "manage_scene.create",
    "manage_gameobject.find",
    "manage_gameobject.create",
    "manage_gameobject.modify",
    "manage_gameobject.delete",
    "manage_asset.search",
    "manage_asset.get_info",
    "manage_asset.create",
    "manage_asset.modify",
    "manage_asset.delete",
    "manage_asset.import",
    "manage_asset.refresh",
    "manage_script.read",
    "manage_script.create",
    "manage_script.update",
    "manage_script.delete",
    "read_console.get",
    "read_console.clear",
    "execute_menu_item.execute",
];

/// Command bridge configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub command_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_bind_retries: u32,
    pub bind_retry_delay: Duration,
    pub pid_file: Option<PathBuf>,
    pub auto_approve_commands: bool,
    pub whitelisted_actions: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6400,
            command_timeout: Duration::from_secs(30),
            read_buffer_size: 16 * 1024 * 1024,
            max_bind_retries: 3,
            bind_retry_delay: Duration::from_secs(1),
            pid_file: None,
            auto_approve_commands: true,
            whitelisted_actions: DEFAULT_WHITELISTED_ACTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> SharedResult<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOSTBRIDGE_BRIDGE_HOST") {
            config.host = host;
        }
        override_parsed(&lookup, "HOSTBRIDGE_BRIDGE_PORT", &mut config.port)?;
        override_secs(&lookup, "HOSTBRIDGE_COMMAND_TIMEOUT_SECS", &mut config.command_timeout)?;
        override_parsed(&lookup, "HOSTBRIDGE_READ_BUFFER_SIZE", &mut config.read_buffer_size)?;
        override_parsed(&lookup, "HOSTBRIDGE_MAX_BIND_RETRIES", &mut config.max_bind_retries)?;
        override_secs(&lookup, "HOSTBRIDGE_BIND_RETRY_DELAY_SECS", &mut config.bind_retry_delay)?;
        if let Some(path) = lookup("HOSTBRIDGE_PID_FILE") {
            config.pid_file = Some(PathBuf::from(path));
        }
        override_parsed(&lookup, "HOSTBRIDGE_AUTO_APPROVE", &mut config.auto_approve_commands)?;
        if let Some(list) = lookup("HOSTBRIDGE_WHITELISTED_ACTIONS") {
            config.whitelisted_actions = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if config.read_buffer_size == 0 {
            return Err(SharedError::invalid_config("HOSTBRIDGE_READ_BUFFER_SIZE", "0"));
        }

        Ok(config)
    }
}

/// Inclusive range of ports the allocator may hand out
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "PortRangeBounds")]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

/// Unchecked wire form of `PortRange`
#[derive(Deserialize)]
struct PortRangeBounds {
    min: u16,
    max: u16,
}

impl TryFrom<PortRangeBounds> for PortRange {
    type Error = SharedError;

    fn try_from(bounds: PortRangeBounds) -> SharedResult<Self> {
        PortRange::new(bounds.min, bounds.max)
    }
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> SharedResult<Self> {
        if min > max {
            return Err(SharedError::invalid_config("port_range", format!("{min}-{max}")));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Number of ports in the range, zero if the bounds are inverted
    pub fn port_count(&self) -> usize {
        if self.min > self.max {
            return 0;
        }
        usize::from(self.max - self.min) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.min..=self.max
    }
}

impl FromStr for PortRange {
    type Err = SharedError;

    /// Parses `min-max`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SharedError::invalid_config("port_range", s);
        let (min, max) = s.split_once('-').ok_or_else(invalid)?;
        let min = min.trim().parse().map_err(|_| invalid())?;
        let max = max.trim().parse().map_err(|_| invalid())?;
        PortRange::new(min, max)
    }
}

/// How the supervisor decides a freshly spawned worker is alive
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StartupProbe {
    /// Worker must accept a TCP connection on its primary port
    Port,
    /// Worker must still be running once the settle delay elapses
    Process,
}

impl FromStr for StartupProbe {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "port" => Ok(StartupProbe::Port),
            "process" => Ok(StartupProbe::Process),
            other => Err(SharedError::invalid_config("startup_probe", other)),
        }
    }
}

/// Worker supervisor configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SupervisorConfig {
    pub executable: PathBuf,
    pub script_path: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub host: String,
    pub primary_port: u16,
    pub secondary_port: u16,
    pub port_range: PortRange,
    pub primary_port_env: String,
    pub secondary_port_env: String,
    pub startup_timeout: Duration,
    pub startup_probe: StartupProbe,
    pub shutdown_timeout: Duration,
    pub restart_delay: Duration,
    pub health_interval: Duration,
    pub health_connect_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub memory_warning_mb: u64,
    pub uptime_warning: Duration,
    pub status_file: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("python3"),
            script_path: PathBuf::from("server.py"),
            working_dir: None,
            host: "127.0.0.1".to_string(),
            primary_port: 6400,
            secondary_port: 6500,
            port_range: PortRange { min: 6400, max: 6599 },
            primary_port_env: "HOSTBRIDGE_PRIMARY_PORT".to_string(),
            secondary_port_env: "HOSTBRIDGE_SECONDARY_PORT".to_string(),
            startup_timeout: Duration::from_secs(30),
            startup_probe: StartupProbe::Port,
            shutdown_timeout: Duration::from_secs(10),
            restart_delay: Duration::from_secs(1),
            health_interval: Duration::from_secs(30),
            health_connect_timeout: Duration::from_secs(2),
            max_consecutive_failures: 3,
            memory_warning_mb: 1024,
            uptime_warning: Duration::from_secs(24 * 60 * 60),
            status_file: None,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> SharedResult<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(exe) = lookup("HOSTBRIDGE_WORKER_EXECUTABLE") {
            config.executable = PathBuf::from(exe);
        }
        if let Some(script) = lookup("HOSTBRIDGE_WORKER_SCRIPT") {
            config.script_path = PathBuf::from(script);
        }
        if let Some(dir) = lookup("HOSTBRIDGE_WORKER_DIR") {
            config.working_dir = Some(PathBuf::from(dir));
        }
        if let Some(host) = lookup("HOSTBRIDGE_WORKER_HOST") {
            config.host = host;
        }
        override_parsed(&lookup, "HOSTBRIDGE_PRIMARY_PORT", &mut config.primary_port)?;
        override_parsed(&lookup, "HOSTBRIDGE_SECONDARY_PORT", &mut config.secondary_port)?;
        override_parsed(&lookup, "HOSTBRIDGE_PORT_RANGE", &mut config.port_range)?;
        override_secs(&lookup, "HOSTBRIDGE_STARTUP_TIMEOUT_SECS", &mut config.startup_timeout)?;
        override_parsed(&lookup, "HOSTBRIDGE_STARTUP_PROBE", &mut config.startup_probe)?;
        override_secs(&lookup, "HOSTBRIDGE_SHUTDOWN_TIMEOUT_SECS", &mut config.shutdown_timeout)?;
        override_secs(&lookup, "HOSTBRIDGE_RESTART_DELAY_SECS", &mut config.restart_delay)?;
        override_secs(&lookup, "HOSTBRIDGE_HEALTH_INTERVAL_SECS", &mut config.health_interval)?;
        override_secs(
            &lookup,
            "HOSTBRIDGE_HEALTH_CONNECT_TIMEOUT_SECS",
            &mut config.health_connect_timeout,
        )?;
        override_parsed(
            &lookup,
            "HOSTBRIDGE_MAX_CONSECUTIVE_FAILURES",
            &mut config.max_consecutive_failures,
        )?;
        override_parsed(&lookup, "HOSTBRIDGE_MEMORY_WARNING_MB", &mut config.memory_warning_mb)?;
        override_secs(&lookup, "HOSTBRIDGE_UPTIME_WARNING_SECS", &mut config.uptime_warning)?;
        if let Some(path) = lookup("HOSTBRIDGE_STATUS_FILE") {
            config.status_file = Some(PathBuf::from(path));
        }

        if config.max_consecutive_failures == 0 {
            return Err(SharedError::invalid_config("HOSTBRIDGE_MAX_CONSECUTIVE_FAILURES", "0"));
        }
        if config.health_interval.is_zero() {
            return Err(SharedError::invalid_config("HOSTBRIDGE_HEALTH_INTERVAL_SECS", "0"));
        }

        Ok(config)
    }
}

/// Load a `.env` file if present; absence is not an error
fn load_dotenv() {
    let _ = dotenv::dotenv();
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> SharedResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| SharedError::invalid_config(key, raw.clone()))?;
    }
    Ok(())
}

fn override_secs<F>(lookup: &F, key: &str, target: &mut Duration) -> SharedResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        let secs: f64 = raw
            .trim()
            .parse()
            .map_err(|_| SharedError::invalid_config(key, raw.clone()))?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(SharedError::invalid_config(key, raw));
        }
        *target = Duration::from_secs_f64(secs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_bridge_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 6400);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.read_buffer_size, 16 * 1024 * 1024);
        assert!(config.auto_approve_commands);
        assert!(config
            .whitelisted_actions
            .contains(&"manage_scene.load".to_string()));
    }

    #[test]
    fn test_bridge_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("HOSTBRIDGE_BRIDGE_PORT", "7000"),
            ("HOSTBRIDGE_COMMAND_TIMEOUT_SECS", "2.5"),
            ("HOSTBRIDGE_AUTO_APPROVE", "false"),
            ("HOSTBRIDGE_WHITELISTED_ACTIONS", "a.b, c.d ,"),
        ]))
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.command_timeout, Duration::from_millis(2500));
        assert!(!config.auto_approve_commands);
        assert_eq!(config.whitelisted_actions, vec!["a.b", "c.d"]);
    }

    #[test]
    fn test_bridge_rejects_bad_port() {
        let err = BridgeConfig::from_lookup(lookup_from(&[("HOSTBRIDGE_BRIDGE_PORT", "abc")]))
            .unwrap_err();
        assert!(err.to_string().contains("HOSTBRIDGE_BRIDGE_PORT"));
    }

    #[test]
    fn test_supervisor_overrides() {
        let config = SupervisorConfig::from_lookup(lookup_from(&[
            ("HOSTBRIDGE_PORT_RANGE", "7000-7010"),
            ("HOSTBRIDGE_STARTUP_PROBE", "process"),
            ("HOSTBRIDGE_MAX_CONSECUTIVE_FAILURES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.port_range, PortRange { min: 7000, max: 7010 });
        assert_eq!(config.startup_probe, StartupProbe::Process);
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.primary_port, 6400);
    }

    #[test]
    fn test_supervisor_rejects_zero_failures() {
        let result = SupervisorConfig::from_lookup(lookup_from(&[(
            "HOSTBRIDGE_MAX_CONSECUTIVE_FAILURES",
            "0",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_port_range_parsing() {
        let range: PortRange = "6400-6599".parse().unwrap();
        assert_eq!(range.port_count(), 200);
        assert!(range.contains(6400));
        assert!(range.contains(6599));
        assert!(!range.contains(6600));

        assert!("6599-6400".parse::<PortRange>().is_err());
        assert!("6400".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_port_range_deserialize_checks_bounds() {
        let range: PortRange = serde_json::from_str(r#"{"min":7000,"max":7001}"#).unwrap();
        assert_eq!(range.port_count(), 2);

        assert!(serde_json::from_str::<PortRange>(r#"{"min":7001,"max":7000}"#).is_err());

        let inverted = PortRange { min: 10, max: 5 };
        assert_eq!(inverted.port_count(), 0);
        assert_eq!(inverted.iter().count(), 0);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = SupervisorConfig::from_lookup(lookup_from(&[(
            "HOSTBRIDGE_RESTART_DELAY_SECS",
            "-1",
        )]));
        assert!(result.is_err());
    }
}
