//! Chat domain type: per-conversation settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::message::Modality;

/// A chat row. Created lazily on the first inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,

    #[serde(default = "default_true")]
    pub is_enabled: bool,

    /// Overrides the configured system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Overrides the configured completion model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Respond to every group message
    #[serde(default)]
    pub respond_on_any: bool,

    /// Respond when a self identity is @-mentioned
    #[serde(default = "default_true")]
    pub respond_on_mention: bool,

    /// Respond when a bot message is quoted
    #[serde(default)]
    pub respond_on_reply: bool,

    /// Debug notices are surfaced until this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_until: Option<DateTime<Utc>>,

    /// Per-modality translator model overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content_models: BTreeMap<Modality, String>,
}

fn default_true() -> bool {
    true
}

impl Chat {
    /// A chat with default settings.
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            is_enabled: true,
            system_prompt: None,
            model: None,
            respond_on_any: false,
            respond_on_mention: true,
            respond_on_reply: false,
            debug_until: None,
            content_models: BTreeMap::new(),
        }
    }

    pub fn is_debugging(&self, now: DateTime<Utc>) -> bool {
        self.debug_until.is_some_and(|until| until > now)
    }
}
