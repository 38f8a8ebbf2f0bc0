//! Shared test helpers for agent tests.

use async_trait::async_trait;
use chrono::Utc;
use parley_actions::{ActionContext, ActionDescriptor, ActionHandler, ActionOutput, Permissions};
use parley_core::chat_handle::ChatHandle;
use parley_core::error::{ActionError, ChatError, ProviderError};
use parley_core::message::{Message, MessageData};
use parley_core::provider::{CompletionRequest, CompletionResponse, Provider, WireToolCall};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::transcode::{AudioTranscoder, TranscodeError};

/// A provider that answers with a sequence of scripted responses and
/// records every request it receives.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<Vec<Result<CompletionResponse, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(CompletionResponse::text(*t))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        let responses = self.responses.lock().unwrap();
        responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| panic!("ScriptedProvider: no response for call #{index}"))
    }
}

/// A response asking for a single tool call.
pub fn call_response(id: &str, name: &str, arguments: &str) -> CompletionResponse {
    CompletionResponse::tool_calls(vec![WireToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }])
}

/// A stored message in chat `c`.
pub fn msg(data: MessageData) -> Message {
    Message {
        id: uuid::Uuid::new_v4().to_string(),
        chat_id: "c".into(),
        sender_ids: vec![],
        data,
        timestamp: Utc::now(),
        cleared_at: None,
    }
}

/// A chat handle that records outbound traffic and approves confirmations.
pub struct RecordingHandle {
    chat_id: String,
    sent: Mutex<Vec<String>>,
    replies: Mutex<Vec<String>>,
}

impl RecordingHandle {
    pub fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.into(),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatHandle for RecordingHandle {
    fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn send(&self, text: &str) -> Result<(), ChatError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result<(), ChatError> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn confirm(&self, _prompt: &str) -> Result<bool, ChatError> {
        Ok(true)
    }
}

/// A transcoder that returns fixed bytes or always fails.
pub struct FakeTranscoder {
    output: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn ok(output: &[u8]) -> Self {
        Self {
            output: Some(output.to_vec()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioTranscoder for FakeTranscoder {
    async fn transcode(&self, _data: &[u8], _target_format: &str) -> Result<Vec<u8>, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone().ok_or(TranscodeError::Failed {
            status: "exit status: 1".into(),
            stderr: "Invalid data found when processing input".into(),
        })
    }
}

struct Fixed(String);

#[async_trait]
impl ActionHandler for Fixed {
    async fn run(&self, _ctx: &ActionContext, _params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        Ok(self.0.clone().into())
    }
}

/// An action that always returns `result`.
pub fn fixed_action(name: &str, result: &str, permissions: Permissions) -> ActionDescriptor {
    ActionDescriptor::new(name, "Returns a fixed result", Arc::new(Fixed(result.into()))).with_permissions(permissions)
}

struct Failing;

#[async_trait]
impl ActionHandler for Failing {
    async fn run(&self, ctx: &ActionContext, _params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        Err(ActionError::ExecutionFailed {
            action: ctx.action.clone(),
            reason: "upstream unavailable".into(),
        })
    }
}

/// An action whose handler always fails.
pub fn failing_action(name: &str) -> ActionDescriptor {
    ActionDescriptor::new(name, "Always fails", Arc::new(Failing)).with_permissions(Permissions::auto())
}

/// An action that answers `run N` and counts its invocations.
#[derive(Clone)]
pub struct CountingAction {
    runs: Arc<AtomicUsize>,
}

impl CountingAction {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn descriptor(&self, name: &str) -> ActionDescriptor {
        ActionDescriptor::new(name, "Counts its runs", Arc::new(self.clone())).with_permissions(Permissions::auto())
    }
}

#[async_trait]
impl ActionHandler for CountingAction {
    async fn run(&self, _ctx: &ActionContext, _params: &serde_json::Value) -> Result<ActionOutput, ActionError> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("run {n}").into())
    }
}
