//! Action execution framework for Parley.
//!
//! Actions are what give the model the ability to act: change chat
//! settings, keep notes, summarize, tell the time. Each one is an
//! [`ActionDescriptor`] in a registry built once at startup. The
//! [`ActionExecutor`] enforces the descriptor's permission flags, injects the
//! capabilities it asked for and asks the user for confirmation when needed.

pub mod chat_settings;
pub mod context;
pub mod current_time;
pub mod descriptor;
pub mod executor;
pub mod notes;
pub mod registry;
pub mod summarize;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ActionContext, CallerContext, LlmHandle};
pub use descriptor::{ActionDescriptor, ActionHandler, ActionOutput, ParamSpec, ParamType, Permissions};
pub use executor::{
    ActionExecution, ActionExecutor, ActionOutcome, CANCELLED_RESULT, CommandInvocation, parse_command,
};
pub use registry::ActionRegistry;

/// Create a registry with all built-in actions.
pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(chat_settings::ClearHistory::descriptor());
    registry.register(chat_settings::SetEnabled::descriptor());
    registry.register(chat_settings::SetResponseMode::descriptor());
    registry.register(chat_settings::DebugMode::descriptor());
    registry.register(notes::SaveNote::descriptor());
    registry.register(notes::ListNotes::descriptor());
    registry.register(summarize::Summarize::descriptor());
    registry.register(current_time::CurrentTime::descriptor());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_builtins() {
        let registry = default_registry();
        assert_eq!(registry.len(), 8);
        for command in ["clear", "enable", "mode", "debug", "note", "notes", "time"] {
            assert!(registry.by_command(command).is_some(), "missing !{command}");
        }
        assert!(registry.get("summarize").unwrap().command.is_none());
    }

    #[test]
    fn every_flag_is_exercised() {
        let registry = default_registry();
        let perms: Vec<Permissions> = registry
            .names()
            .iter()
            .map(|n| registry.get(n).unwrap().permissions)
            .collect();
        assert!(perms.iter().any(|p| !p.auto_execute));
        assert!(perms.iter().any(|p| p.auto_continue));
        assert!(perms.iter().any(|p| p.require_admin));
        assert!(perms.iter().any(|p| p.require_master));
        assert!(perms.iter().any(|p| p.use_chat_db));
        assert!(perms.iter().any(|p| p.use_root_db));
        assert!(perms.iter().any(|p| p.use_llm));
        assert!(perms.iter().any(|p| p.silent));
    }
}
