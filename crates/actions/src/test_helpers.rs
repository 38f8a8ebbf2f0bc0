//! Shared test helpers for action tests.

use async_trait::async_trait;
use parley_core::chat_handle::ChatHandle;
use parley_core::error::{ChatError, ProviderError};
use parley_core::provider::{CompletionRequest, CompletionResponse, Provider};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A provider that answers with a sequence of scripted responses and
/// records every request it receives.
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

/// A chat handle that records outbound traffic and answers confirmations
/// with a fixed value.
pub struct RecordingHandle {
    chat_id: String,
    confirm_answer: bool,
    confirm_delay: Option<Duration>,
    pub confirms: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
}

impl RecordingHandle {
    pub fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.into(),
            confirm_answer: true,
            confirm_delay: None,
            confirms: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(mut self, answer: bool) -> Self {
        self.confirm_answer = answer;
        self
    }

    pub fn slow_to_confirm(mut self, delay: Duration) -> Self {
        self.confirm_delay = Some(delay);
        self
    }

    pub fn confirm_count(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
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
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn confirm(&self, _prompt: &str) -> Result<bool, ChatError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.confirm_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.confirm_answer)
    }
}
