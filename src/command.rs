use serde_json::Value;

use crate::error::{Error, Result};

/// A thin builtin command registry — the minimal collaborator the `command`
/// classification path dispatches to. Deliberately small: the classification and
/// queue engineering is the point of this system, not a command framework.
pub struct CommandRegistry;

impl CommandRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch(&self, name: &str, args: &[String]) -> Result<String> {
        match name {
            "help" => Ok("available commands: help, status, reset".to_string()),
            "status" => Ok("agentcore is running".to_string()),
            "reset" => Ok("session state cleared".to_string()),
            other => Err(Error::business("UNKNOWN_COMMAND", format!("no builtin command `{other}`"))
                .with_context("args", args.join(" "))),
        }
    }

    pub fn dispatch_extracted(&self, extracted: &std::collections::HashMap<String, Value>) -> Result<String> {
        let name = extracted.get("commandName").and_then(Value::as_str).unwrap_or_default();
        let args: Vec<String> = extracted
            .get("args")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        self.dispatch(name, &args)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_commands_dispatch() {
        let registry = CommandRegistry::new();
        assert!(registry.dispatch("status", &[]).is_ok());
    }

    #[test]
    fn unknown_command_is_business_error() {
        let registry = CommandRegistry::new();
        let err = registry.dispatch("bogus", &[]).unwrap_err();
        assert_eq!(err.code, "UNKNOWN_COMMAND");
    }
}
