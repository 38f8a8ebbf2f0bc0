//! Content modality translation.
//!
//! Media the target model cannot read is replaced by a textual description
//! produced by a translator model. Descriptions are cached by content hash
//! and translator model, so the same picture is described once per model.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::BoxFuture;
use parley_core::catalog::ModelCatalog;
use parley_core::message::{ContentBlock, Message, MessageData, Modality};
use parley_core::provider::{CompletionRequest, Provider, WireMessage, WirePart};
use parley_core::store::TranslationCache;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::transcode::AudioNormalizer;

const IMAGE_INSTRUCTION: &str = "Describe this image in detail for someone who cannot see it. \
Transcribe any visible text verbatim. Answer with the description only.";

const AUDIO_INSTRUCTION: &str = "Transcribe this audio. If it contains no speech, describe the \
sounds instead. Answer with the transcription only.";

const VIDEO_INSTRUCTION: &str = "Describe what happens in this video, including any speech and \
visible text. Answer with the description only.";

fn instruction(modality: Modality) -> &'static str {
    match modality {
        Modality::Audio => AUDIO_INSTRUCTION,
        Modality::Video => VIDEO_INSTRUCTION,
        Modality::Image | Modality::Text => IMAGE_INSTRUCTION,
    }
}

/// The placeholder used when media cannot be described.
pub fn unsupported_placeholder(modality: Modality) -> String {
    format!("[Unsupported {}]", modality.label())
}

/// Hex SHA-256 of a media payload's raw bytes.
///
/// Payloads that are not valid base64 are hashed as given.
pub fn content_hash(data: &str) -> String {
    let digest = match BASE64.decode(data) {
        Ok(raw) => Sha256::digest(&raw),
        Err(_) => Sha256::digest(data.as_bytes()),
    };
    format!("{digest:x}")
}

/// Rewrites unsupported media blocks in user messages into text.
pub struct ContentTranslator {
    catalog: Arc<dyn ModelCatalog>,
    /// Translator model per modality when the chat sets none
    defaults: HashMap<Modality, String>,
    provider: Arc<dyn Provider>,
    cache: Arc<dyn TranslationCache>,
    /// Re-encodes audio the translator model cannot take as recorded
    audio: Option<Arc<AudioNormalizer>>,
}

/// What one `translate` call resolves once and hands down the recursion.
struct Plan<'p> {
    target_model: &'p str,
    overrides: &'p BTreeMap<Modality, String>,
}

impl ContentTranslator {
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        defaults: HashMap<Modality, String>,
        provider: Arc<dyn Provider>,
        cache: Arc<dyn TranslationCache>,
    ) -> Self {
        Self {
            catalog,
            defaults,
            provider,
            cache,
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: Arc<AudioNormalizer>) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Translate every unsupported media block for `target_model`.
    ///
    /// Returns the input slice untouched when nothing had to change. Stored
    /// rows are never modified; substitutions land in an owned copy.
    pub async fn translate<'a>(
        &self,
        messages: &'a [Message],
        target_model: &str,
        overrides: &BTreeMap<Modality, String>,
    ) -> Cow<'a, [Message]> {
        let plan = Plan {
            target_model,
            overrides,
        };

        let mut rewritten: Vec<Option<Vec<ContentBlock>>> = Vec::with_capacity(messages.len());
        for message in messages {
            let changed = match &message.data {
                MessageData::User { content } => self.translate_blocks(content, &plan).await,
                MessageData::Assistant { .. } | MessageData::Tool { .. } => None,
            };
            rewritten.push(changed);
        }

        if rewritten.iter().all(Option::is_none) {
            return Cow::Borrowed(messages);
        }

        let owned = messages
            .iter()
            .zip(rewritten)
            .map(|(message, content)| match content {
                Some(content) => Message {
                    data: message.data.with_content(content),
                    ..message.clone()
                },
                None => message.clone(),
            })
            .collect();
        Cow::Owned(owned)
    }

    /// New content for `blocks`, or `None` when nothing was substituted.
    fn translate_blocks<'b>(
        &'b self,
        blocks: &'b [ContentBlock],
        plan: &'b Plan<'b>,
    ) -> BoxFuture<'b, Option<Vec<ContentBlock>>> {
        Box::pin(async move {
            let mut out: Option<Vec<ContentBlock>> = None;
            for (i, block) in blocks.iter().enumerate() {
                let replacement = match block {
                    ContentBlock::Quote { sender_id, content } => {
                        self.translate_blocks(content, plan)
                            .await
                            .map(|content| ContentBlock::Quote {
                                sender_id: sender_id.clone(),
                                content,
                            })
                    }
                    _ => match block.modality() {
                        Some(m) if !self.catalog.supports(plan.target_model, m) => {
                            Some(ContentBlock::text(self.describe(block, m, plan).await))
                        }
                        _ => None,
                    },
                };

                if let Some(replacement) = replacement {
                    let out = out.get_or_insert_with(|| blocks[..i].to_vec());
                    out.push(replacement);
                } else if let Some(out) = out.as_mut() {
                    out.push(block.clone());
                }
            }
            out
        })
    }

    fn translator_model<'p>(&'p self, modality: Modality, plan: &'p Plan<'_>) -> Option<&'p str> {
        plan.overrides
            .get(&modality)
            .or_else(|| self.defaults.get(&modality))
            .map(String::as_str)
            .filter(|m| !m.is_empty())
    }

    async fn describe(&self, block: &ContentBlock, modality: Modality, plan: &Plan<'_>) -> String {
        let placeholder = unsupported_placeholder(modality);
        let Some(model) = self.translator_model(modality, plan) else {
            return placeholder;
        };
        let Some(data) = block.media_data() else {
            return placeholder;
        };

        let hash = content_hash(data);
        match self.cache.get_translation(&hash, model).await {
            Ok(Some(text)) => {
                debug!(%modality, model, "Translation cache hit");
                return labelled(modality, &text);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Translation cache lookup failed"),
        }

        let Some(part) = self.media_part(block).await else {
            return placeholder;
        };
        let request = CompletionRequest::new(model, instruction(modality), vec![WireMessage::user_parts(vec![part])]);

        let text = match self.provider.complete(request).await {
            Ok(response) => match response.visible_text() {
                Some(text) => text.trim().to_string(),
                None => {
                    warn!(%modality, model, "Translator returned an empty description");
                    return placeholder;
                }
            },
            Err(e) => {
                warn!(%modality, model, error = %e, "Content translation failed");
                return placeholder;
            }
        };

        if let Err(e) = self.cache.put_translation(&hash, model, &text).await {
            warn!(error = %e, "Failed to cache translation");
        }
        labelled(modality, &text)
    }
}

impl ContentTranslator {
    async fn media_part(&self, block: &ContentBlock) -> Option<WirePart> {
        match block {
            ContentBlock::Image { data, mime_type } => Some(WirePart::image(mime_type, data)),
            ContentBlock::Video { data, mime_type } => Some(WirePart::video(mime_type, data)),
            ContentBlock::Audio { data, format } => match &self.audio {
                Some(audio) => match audio.wire_part(data, format).await {
                    Ok(part) => Some(part),
                    Err(e) => {
                        warn!(error = %e, format = %format, "Audio could not be prepared for translation");
                        None
                    }
                },
                None => Some(WirePart::audio(format.clone(), data.clone())),
            },
            _ => None,
        }
    }
}

fn labelled(modality: Modality, text: &str) -> String {
    format!("[{}: {}]", modality.label(), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeTranscoder, ScriptedProvider, msg};
    use parley_core::catalog::StaticModelCatalog;
    use parley_core::provider::WireContent;
    use parley_core::error::ProviderError;
    use parley_store::InMemoryStore;

    fn image(data: &str) -> ContentBlock {
        ContentBlock::Image {
            data: data.into(),
            mime_type: "image/png".into(),
        }
    }

    fn catalog() -> Arc<dyn ModelCatalog> {
        let mut models = HashMap::new();
        models.insert("text-only".to_string(), vec![Modality::Text]);
        Arc::new(StaticModelCatalog::new(models))
    }

    fn translator(
        provider: Arc<ScriptedProvider>,
        store: Arc<InMemoryStore>,
        defaults: &[(Modality, &str)],
    ) -> ContentTranslator {
        let defaults = defaults.iter().map(|(m, id)| (*m, id.to_string())).collect();
        ContentTranslator::new(catalog(), defaults, provider, store)
    }

    fn user(content: Vec<ContentBlock>) -> Message {
        msg(MessageData::User { content })
    }

    #[tokio::test]
    async fn identical_content_is_described_once() {
        let provider = Arc::new(ScriptedProvider::texts(&["a red bicycle"]));
        let store = Arc::new(InMemoryStore::new());
        let t = translator(provider.clone(), store.clone(), &[(Modality::Image, "vision")]);

        let messages = vec![user(vec![image("AAAA")]), user(vec![image("AAAA")])];
        let out = t.translate(&messages, "text-only", &BTreeMap::new()).await;

        assert!(matches!(out, Cow::Owned(_)));
        for m in out.iter() {
            assert_eq!(m.data.content(), &[ContentBlock::text("[Image: a red bicycle]")]);
        }
        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.translation_count().await, 1);

        let request = &provider.requests()[0];
        assert_eq!(request.model, "vision");
        assert_eq!(request.system_prompt, IMAGE_INSTRUCTION);
    }

    #[tokio::test]
    async fn changing_translator_model_misses_the_cache() {
        let provider = Arc::new(ScriptedProvider::texts(&["first", "second"]));
        let store = Arc::new(InMemoryStore::new());
        let t = translator(provider.clone(), store, &[(Modality::Image, "vision")]);
        let messages = vec![user(vec![image("AAAA")])];

        t.translate(&messages, "text-only", &BTreeMap::new()).await;
        let overrides = BTreeMap::from([(Modality::Image, "vision-2".to_string())]);
        let out = t.translate(&messages, "text-only", &overrides).await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.requests()[1].model, "vision-2");
        assert_eq!(out[0].data.content(), &[ContentBlock::text("[Image: second]")]);
    }

    #[tokio::test]
    async fn no_translator_model_means_placeholder_without_calls() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let t = translator(provider.clone(), Arc::new(InMemoryStore::new()), &[]);
        let messages = vec![user(vec![
            ContentBlock::text("listen"),
            ContentBlock::Audio {
                data: "AAAA".into(),
                format: "ogg".into(),
            },
        ])];

        let out = t.translate(&messages, "text-only", &BTreeMap::new()).await;
        assert_eq!(
            out[0].data.content(),
            &[ContentBlock::text("listen"), ContentBlock::text("[Unsupported Audio]")]
        );
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn supported_content_is_returned_by_reference() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let t = translator(provider.clone(), Arc::new(InMemoryStore::new()), &[(Modality::Image, "vision")]);
        let messages = vec![user(vec![image("AAAA")]), msg(MessageData::assistant_text("nice"))];

        // Unknown models accept text and images.
        let out = t.translate(&messages, "some-vision-model", &BTreeMap::new()).await;
        match out {
            Cow::Borrowed(slice) => assert!(std::ptr::eq(slice, messages.as_slice())),
            Cow::Owned(_) => panic!("expected the input slice back"),
        }
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn assistant_and_tool_messages_pass_through() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let t = translator(provider.clone(), Arc::new(InMemoryStore::new()), &[(Modality::Image, "vision")]);
        let messages = vec![msg(MessageData::Assistant {
            content: vec![image("AAAA")],
        })];
        let out = t.translate(&messages, "text-only", &BTreeMap::new()).await;
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn quoted_media_is_translated() {
        let provider = Arc::new(ScriptedProvider::texts(&["a cat"]));
        let t = translator(provider.clone(), Arc::new(InMemoryStore::new()), &[(Modality::Image, "vision")]);
        let messages = vec![user(vec![
            ContentBlock::Quote {
                sender_id: Some("bob".into()),
                content: vec![image("AAAA")],
            },
            ContentBlock::text("what is this?"),
        ])];

        let out = t.translate(&messages, "text-only", &BTreeMap::new()).await;
        assert_eq!(
            out[0].data.content(),
            &[
                ContentBlock::Quote {
                    sender_id: Some("bob".into()),
                    content: vec![ContentBlock::text("[Image: a cat]")],
                },
                ContentBlock::text("what is this?"),
            ]
        );
        // The stored rows are untouched.
        assert_eq!(messages[0].data.content()[0], ContentBlock::Quote {
            sender_id: Some("bob".into()),
            content: vec![image("AAAA")],
        });
    }

    #[tokio::test]
    async fn failed_translation_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Timeout("slow".into())),
            Ok(parley_core::provider::CompletionResponse::text("a dog")),
        ]));
        let store = Arc::new(InMemoryStore::new());
        let t = translator(provider.clone(), store.clone(), &[(Modality::Image, "vision")]);
        let messages = vec![user(vec![image("AAAA")])];

        let out = t.translate(&messages, "text-only", &BTreeMap::new()).await;
        assert_eq!(out[0].data.content(), &[ContentBlock::text("[Unsupported Image]")]);
        assert_eq!(store.translation_count().await, 0);

        let out = t.translate(&messages, "text-only", &BTreeMap::new()).await;
        assert_eq!(out[0].data.content(), &[ContentBlock::text("[Image: a dog]")]);
        assert_eq!(provider.call_count(), 2);
    }

    fn voice_note() -> Vec<Message> {
        vec![user(vec![ContentBlock::Audio {
            data: BASE64.encode(b"ogg bytes"),
            format: "ogg".into(),
        }])]
    }

    #[tokio::test]
    async fn voice_notes_are_transcoded_before_translation() {
        let provider = Arc::new(ScriptedProvider::texts(&["see you at six"]));
        let transcoder = Arc::new(FakeTranscoder::ok(b"mp3 bytes"));
        let audio = AudioNormalizer::new(transcoder.clone(), vec!["wav".into(), "mp3".into()], "mp3");
        let t = translator(provider.clone(), Arc::new(InMemoryStore::new()), &[(Modality::Audio, "whisper")])
            .with_audio(Arc::new(audio));

        let note = voice_note();
        let out = t.translate(&note, "text-only", &BTreeMap::new()).await;

        assert_eq!(out[0].data.content(), &[ContentBlock::text("[Audio: see you at six]")]);
        assert_eq!(transcoder.calls(), 1);
        let request = &provider.requests()[0];
        assert_eq!(
            request.messages[0].content,
            Some(WireContent::Parts(vec![WirePart::audio("mp3", BASE64.encode(b"mp3 bytes"))]))
        );
    }

    #[tokio::test]
    async fn untranscodable_audio_is_not_sent_for_translation() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let store = Arc::new(InMemoryStore::new());
        let audio = AudioNormalizer::new(Arc::new(FakeTranscoder::failing()), vec!["mp3".into()], "mp3");
        let t = translator(provider.clone(), store.clone(), &[(Modality::Audio, "whisper")]).with_audio(Arc::new(audio));

        let note = voice_note();
        let out = t.translate(&note, "text-only", &BTreeMap::new()).await;

        assert_eq!(out[0].data.content(), &[ContentBlock::text("[Unsupported Audio]")]);
        assert_eq!(provider.call_count(), 0);
        assert_eq!(store.translation_count().await, 0);
    }

    #[test]
    fn hash_covers_decoded_bytes() {
        assert_eq!(content_hash("aGVsbG8="), content_hash("aGVsbG8="));
        assert_ne!(content_hash("aGVsbG8="), content_hash("d29ybGQ="));
        // sha256("hello")
        assert_eq!(
            content_hash("aGVsbG8="),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
