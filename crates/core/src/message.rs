//! Message and content domain types.
//!
//! These are the persisted value objects that flow through the system:
//! transport delivers blocks → inbound pipeline persists a user message →
//! the loop appends assistant and tool messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The content type of a message block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Capitalized label used in placeholders, e.g. `[Unsupported Image]`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Audio => "Audio",
            Self::Video => "Video",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown modality '{other}'")),
        }
    }
}

/// A single block of message content.
///
/// Media payloads are kept base64-encoded so a block serializes to JSON
/// without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Audio {
        data: String,
        /// Encoding name, e.g. `mp3`, `wav`, `ogg`.
        format: String,
    },
    Video {
        data: String,
        mime_type: String,
    },
    /// A quoted earlier message, possibly containing media of its own.
    Quote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        content: Vec<ContentBlock>,
    },
    ToolCall {
        id: String,
        name: String,
        /// Arguments as the raw JSON string produced by the model.
        arguments: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The modality of a media or text block. Structural blocks return `None`.
    pub fn modality(&self) -> Option<Modality> {
        match self {
            Self::Text { .. } => Some(Modality::Text),
            Self::Image { .. } => Some(Modality::Image),
            Self::Audio { .. } => Some(Modality::Audio),
            Self::Video { .. } => Some(Modality::Video),
            _ => None,
        }
    }

    /// The base64 payload of a media block.
    pub fn media_data(&self) -> Option<&str> {
        match self {
            Self::Image { data, .. } | Self::Audio { data, .. } | Self::Video { data, .. } => {
                Some(data)
            }
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// The role of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// The tagged payload of a persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum MessageData {
    User { content: Vec<ContentBlock> },
    Assistant { content: Vec<ContentBlock> },
    Tool { content: Vec<ContentBlock> },
}

impl MessageData {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            content: vec![ContentBlock::ToolResult {
                tool_call_id: tool_call_id.into(),
                content: content.into(),
            }],
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::User { content } | Self::Assistant { content } | Self::Tool { content } => {
                content
            }
        }
    }

    /// Rebuild the same role around new content.
    pub fn with_content(&self, content: Vec<ContentBlock>) -> Self {
        match self {
            Self::User { .. } => Self::User { content },
            Self::Assistant { .. } => Self::Assistant { content },
            Self::Tool { .. } => Self::Tool { content },
        }
    }
}

/// A persisted conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// The chat this message belongs to
    pub chat_id: String,

    /// Ordered sender identities (empty for bot-authored messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sender_ids: Vec<String>,

    pub data: MessageData,

    /// Canonical ordering key
    pub timestamp: DateTime<Utc>,

    /// Set when the message was cleared from the active context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn role(&self) -> Role {
        self.data.role()
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_block_serializes_with_type_tag() {
        let block = ContentBlock::Image {
            data: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["mime_type"], "image/png");
    }

    #[test]
    fn message_data_is_tagged_by_role() {
        let data = MessageData::tool_result("call_1", "done");
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["content"][0]["type"], "tool_result");
        assert_eq!(json["content"][0]["tool_call_id"], "call_1");

        let parsed: MessageData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.role(), Role::Tool);
    }

    #[test]
    fn nested_quote_keeps_media() {
        let block = ContentBlock::Quote {
            sender_id: Some("alice".into()),
            content: vec![
                ContentBlock::text("look"),
                ContentBlock::Image {
                    data: "AA==".into(),
                    mime_type: "image/jpeg".into(),
                },
            ],
        };
        let json = serde_json::to_string(&block).unwrap();
        let parsed: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn modality_of_blocks() {
        assert_eq!(ContentBlock::text("hi").modality(), Some(Modality::Text));
        let call = ContentBlock::ToolCall {
            id: "1".into(),
            name: "x".into(),
            arguments: "{}".into(),
        };
        assert_eq!(call.modality(), None);
        assert_eq!("Audio".parse::<Modality>().unwrap(), Modality::Audio);
        assert!("smell".parse::<Modality>().is_err());
    }
}
