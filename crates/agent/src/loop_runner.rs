//! The tool-call orchestration loop.
//!
//! One turn submits the conversation to the completion service, runs the
//! tool calls it asks for, and submits again for as long as some action asks
//! for continuation. The number of automatic rounds is capped by `max_depth`.

use chrono::Utc;
use parley_actions::{ActionExecution, ActionExecutor, CallerContext};
use parley_core::chat::Chat;
use parley_core::chat_handle::ChatHandle;
use parley_core::error::{ActionError, Error};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::{ContentBlock, MessageData};
use parley_core::provider::{CompletionRequest, CompletionResponse, Provider, WireMessage, WireToolCall};
use parley_core::store::Storage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What gets persisted in place of a silent action's result.
pub const SILENT_PLACEHOLDER: &str = "[Result delivered to the assistant only]";

/// Shown when a turn is cut off by the depth guard.
pub const DEPTH_LIMIT_WARNING: &str =
    "⚠️ Stopped after too many automatic steps. Send another message to continue.";

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model stopped asking for more rounds
    Completed { rounds: u32 },
    /// Continuation was still requested when the depth guard hit
    DepthLimited { rounds: u32 },
    /// The completion service failed; the error was shown once
    Failed(String),
}

impl TurnOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::DepthLimited { .. } => "depth_limited",
            Self::Failed(_) => "failed",
        }
    }

    fn rounds(&self) -> u32 {
        match self {
            Self::Completed { rounds } | Self::DepthLimited { rounds } => *rounds,
            Self::Failed(_) => 0,
        }
    }
}

/// Everything one turn needs besides the runner's own collaborators.
pub struct Turn<'a> {
    pub chat: &'a Chat,
    pub caller: &'a CallerContext,
    pub model: &'a str,
    pub system_prompt: &'a str,
    /// Chronological context, already formatted for the wire
    pub messages: Vec<WireMessage>,
}

/// Drives completion rounds and tool execution for one turn at a time.
pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    executor: Arc<ActionExecutor>,
    store: Arc<dyn Storage>,
    events: Arc<EventBus>,
    max_depth: u32,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

/// Result of one tool call as the loop sees it.
struct CallReport {
    /// Persisted and surfaced, unless the action is silent
    visible: Option<String>,
    /// Sent back to the model
    for_model: String,
    continue_processing: bool,
    success: bool,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<ActionExecutor>,
        store: Arc<dyn Storage>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            executor,
            store,
            events,
            max_depth: 10,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the maximum number of automatic continuation rounds.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Run one turn to completion, failure, or the depth limit.
    ///
    /// Completion-service failures are surfaced to the chat and reported as
    /// [`TurnOutcome::Failed`]. Storage failures abort the turn with an error.
    pub async fn run(&self, turn: Turn<'_>) -> Result<TurnOutcome, Error> {
        let Turn {
            chat,
            caller,
            model,
            system_prompt,
            messages: mut wire,
        } = turn;
        let handle = caller.handle.as_ref();
        let tools = self.executor.registry().definitions();
        let mut depth: u32 = 0;

        info!(chat_id = %chat.chat_id, model, context = wire.len(), "Starting turn");

        let outcome = loop {
            debug!(chat_id = %chat.chat_id, depth, "Submitting completion");

            let mut request = CompletionRequest::new(model, system_prompt, wire.clone()).with_tools(tools.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(chat_id = %chat.chat_id, depth, error = %e, "Completion failed");
                    self.events.publish(DomainEvent::ErrorOccurred {
                        context: format!("completion for chat {}", chat.chat_id),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    surface(handle, &format!("⚠️ {e}")).await;
                    break TurnOutcome::Failed(e.to_string());
                }
            };

            self.events.publish(DomainEvent::CompletionReceived {
                chat_id: chat.chat_id.clone(),
                model: response.model.clone(),
                tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
                tool_calls: response.tool_calls.len(),
                timestamp: Utc::now(),
            });
            if chat.is_debugging(Utc::now()) {
                surface(handle, &debug_line(model, &response)).await;
            }

            let text = response.visible_text().map(str::to_string);

            if response.tool_calls.is_empty() {
                if let Some(text) = text {
                    self.store
                        .add_message(&chat.chat_id, MessageData::assistant_text(text.as_str()), &[])
                        .await?;
                    surface(handle, &text).await;
                }
                break TurnOutcome::Completed { rounds: depth + 1 };
            }

            let continue_processing = self
                .run_tool_calls(chat, caller, text, response.tool_calls, &mut wire)
                .await?;

            if !continue_processing {
                break TurnOutcome::Completed { rounds: depth + 1 };
            }
            if depth >= self.max_depth {
                warn!(chat_id = %chat.chat_id, depth, "Depth limit reached");
                surface(handle, DEPTH_LIMIT_WARNING).await;
                break TurnOutcome::DepthLimited { rounds: depth + 1 };
            }
            depth += 1;
        };

        self.events.publish(DomainEvent::TurnFinished {
            chat_id: chat.chat_id.clone(),
            rounds: outcome.rounds(),
            outcome: outcome.label().to_string(),
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    /// Persist the assistant's request, then run each call in order.
    ///
    /// Returns whether another completion round was requested.
    async fn run_tool_calls(
        &self,
        chat: &Chat,
        caller: &CallerContext,
        text: Option<String>,
        calls: Vec<WireToolCall>,
        wire: &mut Vec<WireMessage>,
    ) -> Result<bool, Error> {
        let handle = caller.handle.as_ref();

        let mut content: Vec<ContentBlock> = text.iter().map(ContentBlock::text).collect();
        content.extend(calls.iter().map(|call| ContentBlock::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }));
        self.store
            .add_message(&chat.chat_id, MessageData::Assistant { content }, &[])
            .await?;

        if let Some(text) = &text {
            surface(handle, text).await;
        }
        for call in &calls {
            surface(handle, &call_notice(call)).await;
        }
        wire.push(WireMessage::assistant(text, calls.clone()));

        let mut continue_processing = false;
        for call in &calls {
            let started = Instant::now();
            let report = self.run_call(call, caller).await;

            self.events.publish(DomainEvent::ActionExecuted {
                chat_id: chat.chat_id.clone(),
                action: call.name.clone(),
                success: report.success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            let persisted = report.visible.as_deref().unwrap_or(SILENT_PLACEHOLDER);
            self.store
                .add_message(&chat.chat_id, MessageData::tool_result(&call.id, persisted), &[])
                .await?;
            if let Some(visible) = &report.visible {
                surface(handle, visible).await;
            }

            wire.push(WireMessage::tool(&call.id, report.for_model));
            continue_processing |= report.continue_processing;
        }
        Ok(continue_processing)
    }

    async fn run_call(&self, call: &WireToolCall, caller: &CallerContext) -> CallReport {
        let result = match parse_arguments(&call.arguments) {
            Ok(params) => self.executor.execute(&call.name, caller, params, Some(&call.id)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(execution) => succeeded(execution),
            Err(e) if e.is_denial() => {
                info!(chat_id = %caller.chat_id, action = %call.name, error = %e, "Tool call denied");
                CallReport {
                    visible: Some(format!("🚫 {e}")),
                    for_model: format!("Error: {e}"),
                    continue_processing: false,
                    success: false,
                }
            }
            Err(e) => {
                warn!(chat_id = %caller.chat_id, action = %call.name, error = %e, "Tool call failed");
                CallReport {
                    visible: Some(format!("❌ {} failed: {e}", call.name)),
                    for_model: format!("Error: {e}"),
                    continue_processing: true,
                    success: false,
                }
            }
        }
    }
}

fn succeeded(execution: ActionExecution) -> CallReport {
    let result = execution.result().to_string();
    // A declined confirmation is the user's own doing, so it stays visible.
    let hidden = execution.permissions.silent && !execution.is_cancelled();
    CallReport {
        visible: (!hidden).then(|| result.clone()),
        for_model: result,
        continue_processing: execution.permissions.auto_continue,
        success: !execution.is_cancelled(),
    }
}

/// Tool arguments as a JSON object. An empty string means no arguments.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, ActionError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(other) => Err(ActionError::InvalidArguments(format!(
            "arguments must be a JSON object, got {other}"
        ))),
        Err(e) => Err(ActionError::InvalidArguments(format!("malformed JSON arguments: {e}"))),
    }
}

fn call_notice(call: &WireToolCall) -> String {
    let start = call.id.char_indices().rev().nth(5).map_or(0, |(i, _)| i);
    format!("🔧 {} [{}] {}", call.name, &call.id[start..], call.arguments.trim())
}

fn debug_line(requested: &str, response: &CompletionResponse) -> String {
    let model = if response.model.is_empty() {
        requested
    } else {
        &response.model
    };
    match &response.usage {
        Some(u) => format!(
            "🐞 {model} · {} prompt + {} completion = {} tokens",
            u.prompt_tokens, u.completion_tokens, u.total_tokens
        ),
        None => format!("🐞 {model} · usage not reported"),
    }
}

/// Send a user-visible line. Delivery failures are logged, never fatal.
async fn surface(handle: &dyn ChatHandle, text: &str) {
    if let Err(e) = handle.send(text).await {
        warn!(chat_id = %handle.chat_id(), error = %e, "Failed to deliver message");
    }
}
