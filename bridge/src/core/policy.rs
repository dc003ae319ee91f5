//! Action approval policy
//!
//! With auto-approval on, every command reaches the dispatcher. With it
//! off, only commands whose `type.action` key (or bare `type` when there
//! is no `action` parameter) is whitelisted are dispatched.

use std::collections::HashSet;

use shared::BridgeConfig;

use crate::error::DispatchError;
use crate::types::Params;

#[derive(Clone, Debug)]
pub struct ActionPolicy {
    auto_approve: bool,
    whitelist: HashSet<String>,
}

impl ActionPolicy {
    pub fn allow_all() -> Self {
        Self {
            auto_approve: true,
            whitelist: HashSet::new(),
        }
    }

    pub fn whitelist<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            auto_approve: false,
            whitelist: actions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        if config.auto_approve_commands {
            Self::allow_all()
        } else {
            Self::whitelist(config.whitelisted_actions.iter().cloned())
        }
    }

    /// Key a command is matched under
    pub fn action_key(command_type: &str, params: &Params) -> String {
        match params.get("action").and_then(|v| v.as_str()) {
            Some(action) => format!("{command_type}.{}", action.to_ascii_lowercase()),
            None => command_type.to_string(),
        }
    }

    pub fn check(&self, command_type: &str, params: &Params) -> Result<(), DispatchError> {
        if self.auto_approve {
            return Ok(());
        }

        let key = Self::action_key(command_type, params);
        if self.whitelist.contains(&key) {
            Ok(())
        } else {
            Err(DispatchError::NotApproved(key))
        }
    }
}
