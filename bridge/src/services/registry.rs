//! Closure-based command registry
//!
//! A ready-made `CommandDispatcher` for hosts that just want to map type
//! strings to handler functions.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::DispatchError;
use crate::traits::CommandDispatcher;
use crate::types::Params;

type Handler = Box<dyn Fn(&Params) -> Result<Value, DispatchError> + Send + Sync>;

#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Handler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `command_type`
    pub fn register<F>(&mut self, command_type: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&Params) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        self.handlers.insert(command_type.into(), Box::new(handler));
        self
    }

    /// Builder-style `register`
    pub fn with<F>(mut self, command_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Params) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        self.register(command_type, handler);
        self
    }

    pub fn contains(&self, command_type: &str) -> bool {
        self.handlers.contains_key(command_type)
    }

    pub fn command_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("command_types", &self.command_types())
            .finish()
    }
}

impl CommandDispatcher for CommandRegistry {
    fn dispatch(&self, command_type: &str, params: &Params) -> Result<Value, DispatchError> {
        match self.handlers.get(command_type) {
            Some(handler) => handler(params),
            None => Err(DispatchError::UnknownCommand(command_type.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_dispatch() {
        let registry = CommandRegistry::new()
            .with("echo", |params| Ok(Value::Object(params.clone())))
            .with("fail", |_| Err(DispatchError::failed("nope")));

        assert!(registry.contains("echo"));
        assert_eq!(registry.command_types(), vec!["echo", "fail"]);

        let mut params = Params::new();
        params.insert("k".to_string(), json!("v"));
        assert_eq!(registry.dispatch("echo", &params).unwrap(), json!({"k": "v"}));
        assert_eq!(
            registry.dispatch("fail", &params),
            Err(DispatchError::Failed("nope".to_string()))
        );
    }

    #[test]
    fn test_unknown_type_is_error() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.dispatch("missing", &Params::new()),
            Err(DispatchError::UnknownCommand("missing".to_string()))
        );
    }

    #[test]
    fn test_register_replaces_handler() {
        let mut registry = CommandRegistry::new();
        registry.register("x", |_| Ok(json!(1)));
        registry.register("x", |_| Ok(json!(2)));
        assert_eq!(registry.dispatch("x", &Params::new()).unwrap(), json!(2));
    }
}
