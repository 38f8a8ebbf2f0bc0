//! Per-chat notes kept in action-private storage.
//!
//! Notes live in the chat-scoped partition of `save_note`. `list_notes` is a
//! separate action with a scope of its own, so it reads that partition
//! through the root store.

use async_trait::async_trait;
use parley_core::error::ActionError;
use parley_core::store::{ScopedStorage, StorageScope};
use std::sync::Arc;
use tracing::debug;

use crate::context::ActionContext;
use crate::descriptor::{ActionDescriptor, ActionHandler, ActionOutput, ParamSpec, ParamType, Permissions};

const NOTES_ACTION: &str = "save_note";

/// Store a note under a title, replacing any note with the same title.
pub struct SaveNote;

impl SaveNote {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(NOTES_ACTION, "Save a short note for this chat under a title.", Arc::new(Self))
            .with_command("note")
            .with_param(ParamSpec::required("title", ParamType::String, "Short title of the note"))
            .with_param(ParamSpec::required("text", ParamType::String, "The note itself"))
            .with_permissions(Permissions {
                use_chat_db: true,
                ..Permissions::auto()
            })
    }
}

#[async_trait]
impl ActionHandler for SaveNote {
    async fn run(&self, ctx: &ActionContext, params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let title = params["title"].as_str().unwrap_or_default().trim();
        let text = params["text"].as_str().unwrap_or_default().trim();
        if title.is_empty() || text.is_empty() {
            return Err(ActionError::InvalidArguments("title and text must not be empty".into()));
        }

        ctx.chat_db()?.set(title, text).await?;
        debug!(chat_id = %ctx.chat_id, title, "Note saved");
        Ok(format!("Saved note '{title}'.").into())
    }
}

/// List the notes of this chat. Silent: the model sees them, the chat does not.
pub struct ListNotes;

impl ListNotes {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "list_notes",
            "Read all notes saved in this chat. The result is only visible to you.",
            Arc::new(Self),
        )
        .with_command("notes")
        .with_permissions(Permissions {
            use_root_db: true,
            silent: true,
            auto_continue: true,
            ..Permissions::auto()
        })
    }
}

#[async_trait]
impl ActionHandler for ListNotes {
    async fn run(&self, ctx: &ActionContext, _params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let notes = ScopedStorage::new(
            ctx.root_db()?.clone(),
            StorageScope::chat(&ctx.chat_id, NOTES_ACTION),
        );

        let mut lines = Vec::new();
        for title in notes.keys().await? {
            if let Some(text) = notes.get(&title).await? {
                lines.push(format!("- {title}: {text}"));
            }
        }

        if lines.is_empty() {
            return Ok("No notes saved in this chat.".into());
        }
        Ok(lines.join("\n").into())
    }
}
