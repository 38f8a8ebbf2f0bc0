//! Chat administration actions: history clearing, enabling the bot,
//! response modes and debug mode.
//!
//! All of them act on the process-wide store, so they declare `use_root_db`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parley_core::chat::Chat;
use parley_core::error::ActionError;
use std::sync::Arc;
use tracing::info;

use crate::context::ActionContext;
use crate::descriptor::{ActionDescriptor, ActionHandler, ActionOutput, ParamSpec, ParamType, Permissions};

async fn load_chat(ctx: &ActionContext) -> Result<Chat, ActionError> {
    let db = ctx.root_db()?;
    match db.get_chat(&ctx.chat_id).await? {
        Some(chat) => Ok(chat),
        None => Ok(db.create_chat(&ctx.chat_id).await?),
    }
}

/// Soft-delete the active conversation of the current chat.
pub struct ClearHistory;

impl ClearHistory {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "clear_history",
            "Forget the conversation so far in this chat. Old messages are kept but no longer used as context.",
            Arc::new(Self),
        )
        .with_command("clear")
        .with_permissions(Permissions {
            auto_execute: false,
            require_admin: true,
            use_root_db: true,
            ..Permissions::default()
        })
    }
}

#[async_trait]
impl ActionHandler for ClearHistory {
    async fn run(&self, ctx: &ActionContext, _params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let cleared = ctx.root_db()?.clear_messages(&ctx.chat_id).await?;
        info!(chat_id = %ctx.chat_id, cleared, "Conversation history cleared");
        Ok(format!("Cleared {cleared} messages.").into())
    }
}

/// Turn the bot on or off for the current chat.
pub struct SetEnabled;

impl SetEnabled {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new("set_enabled", "Enable or disable the assistant in this chat.", Arc::new(Self))
            .with_command("enable")
            .with_param(
                ParamSpec::optional("enabled", ParamType::Boolean, "true to enable, false to disable")
                    .with_default(serde_json::json!(true)),
            )
            .with_permissions(Permissions {
                require_admin: true,
                use_root_db: true,
                ..Permissions::auto()
            })
    }
}

#[async_trait]
impl ActionHandler for SetEnabled {
    async fn run(&self, ctx: &ActionContext, params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let enabled = params["enabled"].as_bool().unwrap_or(true);
        let mut chat = load_chat(ctx).await?;
        chat.is_enabled = enabled;
        ctx.root_db()?.update_chat(&chat).await?;
        info!(chat_id = %ctx.chat_id, enabled, "Chat enabled flag changed");
        let reply = if enabled { "Assistant enabled." } else { "Assistant disabled." };
        Ok(reply.into())
    }
}

/// Change when the bot answers in group chats.
pub struct SetResponseMode;

impl SetResponseMode {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "set_response_mode",
            "Choose when the assistant answers in a group: on any message, when mentioned, or when replied to.",
            Arc::new(Self),
        )
        .with_command("mode")
        .with_param(ParamSpec::required("trigger", ParamType::String, "One of: any, mention, reply"))
        .with_param(
            ParamSpec::optional("enabled", ParamType::Boolean, "Turn the trigger on or off")
                .with_default(serde_json::json!(true)),
        )
        .with_permissions(Permissions {
            require_admin: true,
            use_root_db: true,
            ..Permissions::auto()
        })
    }
}

#[async_trait]
impl ActionHandler for SetResponseMode {
    async fn run(&self, ctx: &ActionContext, params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let trigger = params["trigger"].as_str().unwrap_or_default().to_lowercase();
        let enabled = params["enabled"].as_bool().unwrap_or(true);
        let mut chat = load_chat(ctx).await?;

        match trigger.as_str() {
            "any" => chat.respond_on_any = enabled,
            "mention" => chat.respond_on_mention = enabled,
            "reply" => chat.respond_on_reply = enabled,
            other => {
                return Err(ActionError::InvalidArguments(format!(
                    "unknown trigger '{other}', expected any, mention or reply"
                )));
            }
        }
        ctx.root_db()?.update_chat(&chat).await?;

        Ok(format!(
            "Response mode: any={}, mention={}, reply={}",
            chat.respond_on_any, chat.respond_on_mention, chat.respond_on_reply
        )
        .into())
    }
}

/// Show model and token usage after every completion for a while.
pub struct DebugMode;

impl DebugMode {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "debug_mode",
            "Show model and token usage for each reply for the given number of minutes (0 turns it off).",
            Arc::new(Self),
        )
        .with_command("debug")
        .with_param(
            ParamSpec::optional("minutes", ParamType::Integer, "How long to stay in debug mode")
                .with_default(serde_json::json!(30)),
        )
        .with_permissions(Permissions {
            require_master: true,
            use_root_db: true,
            ..Permissions::auto()
        })
    }
}

#[async_trait]
impl ActionHandler for DebugMode {
    async fn run(&self, ctx: &ActionContext, params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let minutes = params["minutes"].as_i64().unwrap_or(30);
        if minutes < 0 {
            return Err(ActionError::InvalidArguments("minutes must not be negative".into()));
        }

        let until = match minutes {
            0 => None,
            m => Some(
                Duration::try_minutes(m)
                    .and_then(|d| Utc::now().checked_add_signed(d))
                    .ok_or_else(|| ActionError::InvalidArguments("minutes out of range".into()))?,
            ),
        };

        let mut chat = load_chat(ctx).await?;
        chat.debug_until = until;
        ctx.root_db()?.update_chat(&chat).await?;

        Ok(match chat.debug_until {
            Some(until) => format!("Debug mode on until {}.", until.format("%Y-%m-%d %H:%M UTC")),
            None => "Debug mode off.".to_string(),
        }
        .into())
    }
}
