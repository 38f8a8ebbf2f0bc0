//! The context an action runs with.
//!
//! The full capability struct is always built; storage handles and the
//! completion callback are populated only when the descriptor asks for them.
//! Accessing an ungranted capability fails with `MissingCapability`.

use parley_core::chat_handle::ChatHandle;
use parley_core::error::ActionError;
use parley_core::provider::{CompletionRequest, Provider, WireMessage};
use parley_core::store::{ScopedStorage, Storage};
use std::sync::Arc;
use tracing::debug;

/// Who is invoking an action, as seen by the framework.
#[derive(Clone)]
pub struct CallerContext {
    pub chat_id: String,
    pub sender_ids: Vec<String>,
    pub is_group: bool,
    /// Group admin flag reported by the transport
    pub is_admin: bool,
    /// Model configured for this chat, used for the completion callback
    pub model: Option<String>,
    pub handle: Arc<dyn ChatHandle>,
}

impl std::fmt::Debug for CallerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallerContext")
            .field("chat_id", &self.chat_id)
            .field("sender_ids", &self.sender_ids)
            .field("is_group", &self.is_group)
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

/// A completion-service callback bound to one model.
#[derive(Clone)]
pub struct LlmHandle {
    provider: Arc<dyn Provider>,
    model: String,
}

impl std::fmt::Debug for LlmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmHandle")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmHandle {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One-shot question without tools. Returns the model's text.
    pub async fn ask(&self, system_prompt: &str, prompt: &str) -> Result<String, ActionError> {
        let request = CompletionRequest::new(
            self.model.clone(),
            system_prompt,
            vec![WireMessage::user_text(prompt)],
        );
        debug!(model = %self.model, "Action completion request");
        let response = self.provider.complete(request).await?;
        Ok(response.text.unwrap_or_default())
    }
}

pub struct ActionContext {
    pub action: String,
    pub chat_id: String,
    pub sender_ids: Vec<String>,
    pub is_group: bool,
    pub is_admin: bool,
    pub is_master: bool,
    /// Set when the model invoked the action, `None` for chat commands
    pub tool_call_id: Option<String>,
    pub handle: Arc<dyn ChatHandle>,
    pub(crate) chat_db: Option<ScopedStorage>,
    pub(crate) root_db: Option<Arc<dyn Storage>>,
    pub(crate) llm: Option<LlmHandle>,
}

impl ActionContext {
    fn missing(&self, capability: &str) -> ActionError {
        ActionError::MissingCapability {
            action: self.action.clone(),
            capability: capability.into(),
        }
    }

    /// Storage private to this action in this chat.
    pub fn chat_db(&self) -> Result<&ScopedStorage, ActionError> {
        self.chat_db.as_ref().ok_or_else(|| self.missing("chat_db"))
    }

    /// The process-wide store.
    pub fn root_db(&self) -> Result<&Arc<dyn Storage>, ActionError> {
        self.root_db.as_ref().ok_or_else(|| self.missing("root_db"))
    }

    pub fn llm(&self) -> Result<&LlmHandle, ActionError> {
        self.llm.as_ref().ok_or_else(|| self.missing("llm"))
    }

    pub fn primary_sender(&self) -> &str {
        self.sender_ids.first().map(String::as_str).unwrap_or("unknown")
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.action)
            .field("chat_id", &self.chat_id)
            .field("tool_call_id", &self.tool_call_id)
            .field("chat_db", &self.chat_db.is_some())
            .field("root_db", &self.root_db.is_some())
            .field("llm", &self.llm.is_some())
            .finish()
    }
}
