//! Provider trait: the abstraction over the LLM completion service.
//!
//! A Provider takes a system prompt, chronological wire-format messages and
//! the callable tool specs, and answers with free text, tool calls, or both.
//!
//! The wire types here mirror the OpenAI chat-completions shape, which is what
//! the shipped client speaks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;

/// Role of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One content part of a multimodal user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: MediaUrl },
    InputAudio { input_audio: InputAudio },
    VideoUrl { video_url: MediaUrl },
}

impl WirePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// An image part carried as a `data:` URL.
    pub fn image(mime_type: &str, base64: &str) -> Self {
        Self::ImageUrl {
            image_url: MediaUrl {
                url: format!("data:{mime_type};base64,{base64}"),
            },
        }
    }

    pub fn audio(format: impl Into<String>, base64: impl Into<String>) -> Self {
        Self::InputAudio {
            input_audio: InputAudio {
                data: base64.into(),
                format: format.into(),
            },
        }
    }

    pub fn video(mime_type: &str, base64: &str) -> Self {
        Self::VideoUrl {
            video_url: MediaUrl {
                url: format!("data:{mime_type};base64,{base64}"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudio {
    pub data: String,
    pub format: String,
}

/// Message content: a plain string or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the action to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// A message in completion-service wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<WireContent>,

    /// Only present on assistant messages that requested tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,

    /// Only present on tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: Some(WireContent::Text(text.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: Some(WireContent::Text(text.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user_parts(parts: Vec<WirePart>) -> Self {
        Self {
            role: WireRole::User,
            content: Some(WireContent::Parts(parts)),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant message; `text` is omitted when empty.
    pub fn assistant(text: Option<String>, tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: text.filter(|t| !t.is_empty()).map(WireContent::Text),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Tool,
            content: Some(WireContent::Text(content.into())),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Concatenated text of this message (parts joined by newlines).
    pub fn text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(WireContent::Text(t)) => t.clone(),
            Some(WireContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    WirePart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
}

/// One round trip to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "openai/gpt-4o")
    pub model: String,

    /// Sent ahead of `messages` as a system message
    pub system_prompt: String,

    /// Chronological conversation in wire format
    pub messages: Vec<WireMessage>,

    /// Callable tools (empty = none)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// The answer of the completion service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Free text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }

    /// Free text as sent, `None` when blank.
    pub fn visible_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Submit one completion request.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError>;
}
