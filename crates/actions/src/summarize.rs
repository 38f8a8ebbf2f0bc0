//! Summarize the recent conversation with a second completion call.

use async_trait::async_trait;
use parley_core::error::ActionError;
use parley_core::message::{ContentBlock, MessageData};
use std::sync::Arc;

use crate::context::ActionContext;
use crate::descriptor::{ActionDescriptor, ActionHandler, ActionOutput, ParamSpec, ParamType, Permissions};

const SUMMARY_PROMPT: &str = "Summarize the following chat transcript in a few sentences. \
Keep names and decisions; drop greetings and small talk.";

pub struct Summarize;

impl Summarize {
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "summarize",
            "Summarize the recent conversation in this chat.",
            Arc::new(Self),
        )
        .with_param(
            ParamSpec::optional("limit", ParamType::Integer, "How many recent messages to include")
                .with_default(serde_json::json!(30)),
        )
        .with_permissions(Permissions {
            use_llm: true,
            use_root_db: true,
            ..Permissions::auto()
        })
    }
}

fn transcript_line(data: &MessageData) -> Option<String> {
    let text: Vec<&str> = data.content().iter().filter_map(ContentBlock::as_text).collect();
    if text.is_empty() {
        return None;
    }
    let speaker = match data {
        MessageData::User { .. } => "user",
        MessageData::Assistant { .. } => "assistant",
        MessageData::Tool { .. } => return None,
    };
    Some(format!("{speaker}: {}", text.join(" ")))
}

#[async_trait]
impl ActionHandler for Summarize {
    async fn run(&self, ctx: &ActionContext, params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let limit = params["limit"].as_u64().unwrap_or(30).clamp(1, 500) as usize;
        let rows = ctx.root_db()?.get_messages(&ctx.chat_id, limit).await?;

        let transcript: Vec<String> = rows
            .iter()
            .rev()
            .filter_map(|m| transcript_line(&m.data))
            .collect();
        if transcript.is_empty() {
            return Ok("There is nothing to summarize yet.".into());
        }

        let summary = ctx.llm()?.ask(SUMMARY_PROMPT, &transcript.join("\n")).await?;
        Ok(summary.into())
    }
}
