//! Core types shared by the bridge and supervisor components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global component ID singleton - set once at startup
static COMPONENT_ID: OnceLock<ComponentId> = OnceLock::new();

/// Identity used when nothing has called an `init_*` function (tests, embedding hosts)
static DEFAULT_COMPONENT: ComponentId = ComponentId::Host;

/// Identifier for the component emitting logs in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentId {
    /// Command bridge running inside the host
    Bridge,
    /// Worker process supervisor
    Supervisor,
    /// Embedding host that never declared itself
    Host,
}

impl ComponentId {
    /// Initialize the global component ID for the bridge
    pub fn init_bridge() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Bridge)
    }

    /// Initialize the global component ID for the supervisor
    pub fn init_supervisor() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Supervisor)
    }

    /// Get the global component ID, or `Host` if never initialized
    pub fn current() -> &'static ComponentId {
        COMPONENT_ID.get().unwrap_or(&DEFAULT_COMPONENT)
    }

    /// Crate name used as the tracing target prefix for this component
    pub fn target(&self) -> &'static str {
        match self {
            ComponentId::Bridge => "bridge",
            ComponentId::Supervisor => "supervisor",
            ComponentId::Host => "host",
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target())
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
