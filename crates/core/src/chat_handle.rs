//! ChatHandle trait: the capability callbacks a transport hands us.
//!
//! The transport itself (protocol parsing for a specific chat network) is
//! external. It delivers an [`IncomingMessage`] and a handle through which
//! every outbound effect flows: send, reply, react, poll and confirm.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use crate::error::ChatError;
use crate::message::ContentBlock;

#[async_trait]
pub trait ChatHandle: Send + Sync {
    /// The chat this handle writes to.
    fn chat_id(&self) -> &str;

    /// Send a new message to the chat.
    async fn send(&self, text: &str) -> Result<(), ChatError>;

    /// Reply to the inbound message.
    async fn reply(&self, text: &str) -> Result<(), ChatError>;

    /// React to the inbound message with an emoji.
    async fn react(&self, _emoji: &str) -> Result<(), ChatError> {
        Err(ChatError::Unsupported("react".into()))
    }

    /// Post a poll.
    async fn poll(&self, _question: &str, _options: &[String]) -> Result<(), ChatError> {
        Err(ChatError::Unsupported("poll".into()))
    }

    /// Ask the user a yes/no question. Blocks until answered.
    async fn confirm(&self, prompt: &str) -> Result<bool, ChatError>;
}

/// A message delivered by the transport.
#[derive(Clone)]
pub struct IncomingMessage {
    pub chat_id: String,

    /// Ordered sender identities (e.g. phone number, then username)
    pub sender_ids: Vec<String>,

    /// Human-readable sender name, used as the group-chat prefix
    pub sender_name: Option<String>,

    /// Whether the transport reports the sender as a group admin
    pub sender_is_admin: bool,

    pub content: Vec<ContentBlock>,

    pub is_group: bool,

    pub timestamp: DateTime<Utc>,

    /// The bot's own identities on this transport
    pub self_ids: Vec<String>,

    /// Sender of the quoted message, if this message quotes one
    pub quoted_sender_id: Option<String>,

    pub handle: Arc<dyn ChatHandle>,
}

impl IncomingMessage {
    /// First text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    pub fn primary_sender(&self) -> &str {
        self.sender_ids.first().map(String::as_str).unwrap_or("unknown")
    }
}

impl std::fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("chat_id", &self.chat_id)
            .field("sender_ids", &self.sender_ids)
            .field("is_group", &self.is_group)
            .field("blocks", &self.content.len())
            .finish()
    }
}
