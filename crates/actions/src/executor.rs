//! Action execution: resolve, authorize, build the scoped context, confirm,
//! then invoke the handler.

use parley_core::error::ActionError;
use parley_core::provider::Provider;
use parley_core::store::{ScopedStorage, Storage, StorageScope};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::{ActionContext, CallerContext, LlmHandle};
use crate::descriptor::{ActionDescriptor, ActionOutput, Permissions};
use crate::registry::ActionRegistry;

/// Text reported when the user declines a confirmation.
pub const CANCELLED_RESULT: &str = "Action cancelled by the user.";

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Completed(String),
    /// The user refused (or did not answer) the confirmation prompt
    Cancelled,
}

/// The result of one action invocation plus the permissions in effect.
#[derive(Debug, Clone)]
pub struct ActionExecution {
    pub outcome: ActionOutcome,
    /// Descriptor flags, with `auto_continue` replaced by a handler override
    pub permissions: Permissions,
}

impl ActionExecution {
    pub fn result(&self) -> &str {
        match &self.outcome {
            ActionOutcome::Completed(result) => result,
            ActionOutcome::Cancelled => CANCELLED_RESULT,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == ActionOutcome::Cancelled
    }
}

/// A `!command arg arg...` shortcut split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation<'a> {
    pub command: &'a str,
    pub args: Vec<&'a str>,
}

/// Parse a leading `!command` token. Returns `None` for ordinary text.
pub fn parse_command(text: &str) -> Option<CommandInvocation<'_>> {
    let rest = text.trim_start().strip_prefix('!')?;
    let mut tokens = rest.split_whitespace();
    let command = tokens.next()?;
    if rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(CommandInvocation {
        command,
        args: tokens.collect(),
    })
}

/// Runs actions from the registry against a caller.
pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    store: Arc<dyn Storage>,
    provider: Arc<dyn Provider>,
    default_model: String,
    master_ids: HashSet<String>,
    confirm_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        store: Arc<dyn Storage>,
        provider: Arc<dyn Provider>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            provider,
            default_model: default_model.into(),
            master_ids: HashSet::new(),
            confirm_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_master_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.master_ids = ids.into_iter().collect();
        self
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Whether any of the caller's identities is a master identity.
    pub fn is_master(&self, sender_ids: &[String]) -> bool {
        sender_ids.iter().any(|id| self.master_ids.contains(id))
    }

    /// Execute an action by name.
    ///
    /// Denials (`NotFound`, `PermissionDenied`) and handler errors are
    /// returned as errors. A declined confirmation is not an error.
    pub async fn execute(
        &self,
        name: &str,
        caller: &CallerContext,
        params: serde_json::Value,
        tool_call_id: Option<&str>,
    ) -> Result<ActionExecution, ActionError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| ActionError::NotFound(name.to_string()))?;

        let is_master = self.is_master(&caller.sender_ids);
        self.authorize(descriptor, caller, is_master)?;

        let params = descriptor.resolve_params(params)?;
        let ctx = self.build_context(descriptor, caller, is_master, tool_call_id);

        if !descriptor.permissions.auto_execute && !self.confirm(descriptor, caller, &params).await {
            info!(chat_id = %caller.chat_id, action = %name, "Action declined by user");
            return Ok(ActionExecution {
                outcome: ActionOutcome::Cancelled,
                permissions: descriptor.permissions,
            });
        }

        debug!(chat_id = %caller.chat_id, action = %name, "Running action");
        let output = descriptor.handler.run(&ctx, &params).await?;

        let mut permissions = descriptor.permissions;
        let result = match output {
            ActionOutput::Plain(result) => result,
            ActionOutput::Override {
                result,
                auto_continue,
            } => {
                permissions.auto_continue = auto_continue;
                result
            }
        };

        Ok(ActionExecution {
            outcome: ActionOutcome::Completed(result),
            permissions,
        })
    }

    fn authorize(
        &self,
        descriptor: &ActionDescriptor,
        caller: &CallerContext,
        is_master: bool,
    ) -> Result<(), ActionError> {
        let perms = &descriptor.permissions;

        if perms.require_master && !is_master {
            warn!(chat_id = %caller.chat_id, action = %descriptor.name, "Master-only action denied");
            return Err(ActionError::PermissionDenied {
                action: descriptor.name.clone(),
                reason: "only the bot owner may use this action".into(),
            });
        }

        let is_admin = caller.is_admin || !caller.is_group || is_master;
        if perms.require_admin && !is_admin {
            warn!(chat_id = %caller.chat_id, action = %descriptor.name, "Admin-only action denied");
            return Err(ActionError::PermissionDenied {
                action: descriptor.name.clone(),
                reason: "only group admins may use this action".into(),
            });
        }
        Ok(())
    }

    fn build_context(
        &self,
        descriptor: &ActionDescriptor,
        caller: &CallerContext,
        is_master: bool,
        tool_call_id: Option<&str>,
    ) -> ActionContext {
        let perms = &descriptor.permissions;
        let backend: Arc<dyn Storage> = self.store.clone();

        ActionContext {
            action: descriptor.name.clone(),
            chat_id: caller.chat_id.clone(),
            sender_ids: caller.sender_ids.clone(),
            is_group: caller.is_group,
            is_admin: caller.is_admin || !caller.is_group || is_master,
            is_master,
            tool_call_id: tool_call_id.map(String::from),
            handle: caller.handle.clone(),
            chat_db: perms.use_chat_db.then(|| {
                ScopedStorage::new(
                    backend.clone(),
                    StorageScope::chat(&caller.chat_id, &descriptor.name),
                )
            }),
            root_db: perms.use_root_db.then(|| backend.clone()),
            llm: perms.use_llm.then(|| {
                let model = caller.model.clone().unwrap_or_else(|| self.default_model.clone());
                LlmHandle::new(self.provider.clone(), model)
            }),
        }
    }

    /// Ask the user; a transport error or timeout counts as "no".
    async fn confirm(
        &self,
        descriptor: &ActionDescriptor,
        caller: &CallerContext,
        params: &serde_json::Value,
    ) -> bool {
        let prompt = format!(
            "Allow action '{}' with {}? (yes/no)",
            descriptor.name, params
        );
        match tokio::time::timeout(self.confirm_timeout, caller.handle.confirm(&prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(chat_id = %caller.chat_id, action = %descriptor.name, error = %e, "Confirmation failed");
                false
            }
            Err(_) => {
                warn!(chat_id = %caller.chat_id, action = %descriptor.name, "Confirmation timed out");
                false
            }
        }
    }
}
