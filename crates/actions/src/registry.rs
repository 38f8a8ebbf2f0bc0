//! A name-indexed table of action descriptors, built once at startup.

use parley_core::provider::ToolDefinition;
use std::collections::HashMap;

use crate::descriptor::ActionDescriptor;

/// A registry of available actions.
///
/// The orchestration loop uses this to:
/// 1. Get tool specs to send to the completion service
/// 2. Look up actions by name (tool calls) or short command (`!cmd`)
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: Vec<ActionDescriptor>,
    by_name: HashMap<String, usize>,
    by_command: HashMap<String, usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, descriptor: ActionDescriptor) {
        let index = match self.by_name.get(&descriptor.name) {
            Some(&index) => {
                if let Some(old) = &self.actions[index].command {
                    self.by_command.remove(old);
                }
                self.actions[index] = descriptor;
                index
            }
            None => {
                self.actions.push(descriptor);
                self.actions.len() - 1
            }
        };

        let descriptor = &self.actions[index];
        self.by_name.insert(descriptor.name.clone(), index);
        if let Some(command) = &descriptor.command {
            self.by_command.insert(command.to_lowercase(), index);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.by_name.get(name).map(|&i| &self.actions[i])
    }

    /// Look up an action by its short command (without the `!`).
    pub fn by_command(&self, command: &str) -> Option<&ActionDescriptor> {
        self.by_command
            .get(&command.to_lowercase())
            .map(|&i| &self.actions[i])
    }

    /// Tool specs for every action, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.actions.iter().map(ActionDescriptor::to_definition).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActionContext;
    use crate::descriptor::{ActionHandler, ActionOutput};
    use async_trait::async_trait;
    use parley_core::error::ActionError;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn run(
            &self,
            _ctx: &ActionContext,
            params: &serde_json::Value,
        ) -> Result<ActionOutput, ActionError> {
            Ok(params.to_string().into())
        }
    }

    fn echo(name: &str, command: Option<&str>) -> ActionDescriptor {
        let d = ActionDescriptor::new(name, "Echoes back the input", Arc::new(Echo));
        match command {
            Some(c) => d.with_command(c),
            None => d,
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ActionRegistry::new();
        registry.register(echo("echo", Some("Echo")));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.by_command("echo").unwrap().name, "echo");
        assert_eq!(registry.by_command("ECHO").unwrap().name, "echo");
    }

    #[test]
    fn definitions_keep_registration_order() {
        let mut registry = ActionRegistry::new();
        registry.register(echo("b", None));
        registry.register(echo("a", None));
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn re_registering_replaces_command() {
        let mut registry = ActionRegistry::new();
        registry.register(echo("echo", Some("old")));
        registry.register(echo("echo", Some("new")));
        assert_eq!(registry.len(), 1);
        assert!(registry.by_command("old").is_none());
        assert!(registry.by_command("new").is_some());
    }
}
