//! The inbound pipeline: one transport message in, zero or more replies out.

use chrono::Utc;
use parley_actions::{
    ActionExecutor, ActionOutcome, ActionRegistry, CANCELLED_RESULT, CallerContext, default_registry, parse_command,
};
use parley_config::AppConfig;
use parley_core::chat::Chat;
use parley_core::chat_handle::{ChatHandle, IncomingMessage};
use parley_core::error::Error;
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::{ContentBlock, MessageData};
use parley_core::provider::Provider;
use parley_core::store::Storage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::formatter::{MessageFormatter, format_user_message, should_respond};
use crate::loop_runner::{Turn, TurnOutcome, TurnRunner};
use crate::transcode::{AudioNormalizer, AudioTranscoder, FfmpegTranscoder};
use crate::translator::ContentTranslator;

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A `!command` was executed and answered
    Command,
    /// The chat is disabled; nothing was stored
    Disabled,
    /// Stored as context, but the bot stays quiet
    Stored,
    /// A turn ran
    Responded(TurnOutcome),
}

/// The assembled conversational agent.
///
/// `Agent` is `Send + Sync` and may serve turns for different chats
/// concurrently. Turns for the same chat should be queued by the caller.
pub struct Agent {
    store: Arc<dyn Storage>,
    executor: Arc<ActionExecutor>,
    runner: TurnRunner,
    translator: ContentTranslator,
    formatter: MessageFormatter,
    events: Arc<EventBus>,
    default_model: String,
    system_prompt: String,
    history_limit: usize,
}

/// Builds an [`Agent`] from configuration, with optional replacements for
/// the action registry, the transcoder and the event bus.
pub struct AgentBuilder {
    config: AppConfig,
    store: Arc<dyn Storage>,
    provider: Arc<dyn Provider>,
    registry: Option<ActionRegistry>,
    transcoder: Option<Arc<dyn AudioTranscoder>>,
    events: Option<Arc<EventBus>>,
}

impl AgentBuilder {
    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn AudioTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Agent {
        let config = self.config;
        let events = self.events.unwrap_or_default();
        let registry = Arc::new(self.registry.unwrap_or_else(default_registry));
        let transcoder = self
            .transcoder
            .unwrap_or_else(|| Arc::new(FfmpegTranscoder::new(config.audio.ffmpeg_path.clone())));

        let executor = Arc::new(
            ActionExecutor::new(
                registry,
                self.store.clone(),
                self.provider.clone(),
                config.default_model.clone(),
            )
            .with_master_ids(config.master_ids.clone())
            .with_confirm_timeout(Duration::from_secs(config.agent.confirm_timeout_secs)),
        );

        let runner = TurnRunner::new(self.provider.clone(), executor.clone(), self.store.clone(), events.clone())
            .with_max_depth(config.agent.max_depth)
            .with_temperature(config.agent.temperature)
            .with_max_tokens(config.agent.max_tokens);

        let audio = Arc::new(AudioNormalizer::new(
            transcoder,
            config.audio.accepted_formats.clone(),
            config.audio.target_format.clone(),
        ));

        let translator = ContentTranslator::new(
            Arc::new(config.model_catalog()),
            config.translation.defaults(),
            self.provider,
            self.store.clone(),
        )
        .with_audio(audio.clone());

        let formatter = MessageFormatter::new(audio);

        Agent {
            store: self.store,
            executor,
            runner,
            translator,
            formatter,
            events,
            default_model: config.default_model,
            system_prompt: config.system_prompt,
            history_limit: config.agent.history_limit,
        }
    }
}

impl Agent {
    pub fn builder(config: AppConfig, store: Arc<dyn Storage>, provider: Arc<dyn Provider>) -> AgentBuilder {
        AgentBuilder {
            config,
            store,
            provider,
            registry: None,
            transcoder: None,
            events: None,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Handle one inbound message end to end.
    pub async fn handle_message(&self, incoming: IncomingMessage) -> Result<HandleOutcome, Error> {
        let chat = match self.store.get_chat(&incoming.chat_id).await? {
            Some(chat) => chat,
            None => {
                info!(chat_id = %incoming.chat_id, "New chat");
                self.store.create_chat(&incoming.chat_id).await?
            }
        };
        let model = chat.model.clone().unwrap_or_else(|| self.default_model.clone());
        let caller = CallerContext {
            chat_id: incoming.chat_id.clone(),
            sender_ids: incoming.sender_ids.clone(),
            is_group: incoming.is_group,
            is_admin: incoming.sender_is_admin,
            model: Some(model.clone()),
            handle: incoming.handle.clone(),
        };

        if self.try_command(&incoming, &caller).await {
            return Ok(HandleOutcome::Command);
        }

        if !chat.is_enabled {
            debug!(chat_id = %chat.chat_id, "Chat disabled, ignoring message");
            return Ok(HandleOutcome::Disabled);
        }

        let system_suffix = self.store_user_message(&incoming).await?;

        if !should_respond(
            &chat,
            incoming.is_group,
            &incoming.content,
            &incoming.self_ids,
            incoming.quoted_sender_id.as_deref(),
        ) {
            return Ok(HandleOutcome::Stored);
        }

        let outcome = self.respond(&chat, &caller, &model, system_suffix).await?;
        Ok(HandleOutcome::Responded(outcome))
    }

    /// Run a `!command` if the message starts with a known one.
    ///
    /// Unknown commands are treated as ordinary text.
    async fn try_command(&self, incoming: &IncomingMessage, caller: &CallerContext) -> bool {
        let Some(invocation) = incoming.first_text().and_then(parse_command) else {
            return false;
        };
        let Some(descriptor) = self.executor.registry().by_command(invocation.command) else {
            return false;
        };

        info!(chat_id = %caller.chat_id, action = %descriptor.name, "Running chat command");
        let result = match descriptor.bind_tokens(&invocation.args) {
            Ok(params) => self.executor.execute(&descriptor.name, caller, params, None).await,
            Err(e) => Err(e),
        };

        let reply = match result {
            Ok(execution) => match execution.outcome {
                ActionOutcome::Completed(text) => text,
                ActionOutcome::Cancelled => CANCELLED_RESULT.to_string(),
            },
            Err(e) if e.is_denial() => format!("🚫 {e}"),
            Err(e) => format!("❌ {e}"),
        };
        deliver_reply(incoming.handle.as_ref(), &reply).await;
        true
    }

    /// Persist the normalized user message. Returns the system-prompt suffix
    /// for this setting, if any.
    async fn store_user_message(&self, incoming: &IncomingMessage) -> Result<Option<String>, Error> {
        let sender_name = incoming
            .sender_name
            .as_deref()
            .unwrap_or_else(|| incoming.primary_sender());

        let first_text = incoming
            .content
            .iter()
            .position(|b| matches!(b, ContentBlock::Text { .. }));
        let original = first_text
            .and_then(|i| incoming.content[i].as_text())
            .unwrap_or_default();
        let formatted = format_user_message(
            original,
            incoming.is_group,
            sender_name,
            incoming.timestamp,
            &incoming.self_ids,
        );
        let mut content = incoming.content.clone();
        match first_text {
            Some(i) => content[i] = ContentBlock::text(formatted.text),
            // Media-only messages still carry who sent them and when.
            None => content.insert(0, ContentBlock::text(formatted.text)),
        }

        self.store
            .add_message(&incoming.chat_id, MessageData::User { content }, &incoming.sender_ids)
            .await?;

        self.events.publish(DomainEvent::MessageReceived {
            chat_id: incoming.chat_id.clone(),
            sender_id: incoming.primary_sender().to_string(),
            content_preview: original.chars().take(80).collect(),
            timestamp: Utc::now(),
        });
        Ok(formatted.system_suffix)
    }

    async fn respond(
        &self,
        chat: &Chat,
        caller: &CallerContext,
        model: &str,
        system_suffix: Option<String>,
    ) -> Result<TurnOutcome, Error> {
        let history = self.store.get_messages(&chat.chat_id, self.history_limit).await?;
        let translated = self.translator.translate(&history, model, &chat.content_models).await;
        let messages = self.formatter.format_messages_for_openai(&translated).await;

        let base = chat.system_prompt.as_deref().unwrap_or(&self.system_prompt);
        let system_prompt = match system_suffix {
            Some(suffix) => format!("{base}\n\n{suffix}"),
            None => base.to_string(),
        };

        self.runner
            .run(Turn {
                chat,
                caller,
                model,
                system_prompt: &system_prompt,
                messages,
            })
            .await
    }
}

async fn deliver_reply(handle: &dyn ChatHandle, text: &str) {
    if let Err(e) = handle.reply(text).await {
        warn!(chat_id = %handle.chat_id(), error = %e, "Failed to deliver reply");
    }
}
