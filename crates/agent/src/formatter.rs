//! Response gate and context formatting.
//!
//! Decides whether an inbound message deserves an answer, normalizes user
//! text before it is stored, and turns stored rows into the wire format the
//! completion service expects.

use chrono::{DateTime, Utc};
use parley_core::chat::Chat;
use parley_core::message::{ContentBlock, Message, MessageData};
use parley_core::provider::{WireContent, WireMessage, WirePart, WireToolCall};
use std::sync::Arc;
use tracing::warn;

use crate::transcode::AudioNormalizer;

/// Placeholder for audio the transcoder could not handle.
pub const AUDIO_UNAVAILABLE: &str = "[Audio could not be processed]";

const GROUP_CONTEXT: &str = "You are in a group chat. Each user message starts with the \
sender's name, so several people may be talking to you. Address people by name when it helps.";

/// Whether the bot should answer an inbound message.
pub fn should_respond(
    chat: &Chat,
    is_group: bool,
    content: &[ContentBlock],
    self_ids: &[String],
    quoted_sender_id: Option<&str>,
) -> bool {
    if !chat.is_enabled {
        return false;
    }
    if !is_group || chat.respond_on_any {
        return true;
    }

    let mentioned = chat.respond_on_mention && mentions_any(content, self_ids);
    let replied_to = chat.respond_on_reply
        && quoted_sender_id.is_some_and(|quoted| self_ids.iter().any(|id| id.eq_ignore_ascii_case(quoted)));
    mentioned || replied_to
}

fn mentions_any(content: &[ContentBlock], self_ids: &[String]) -> bool {
    content.iter().filter_map(ContentBlock::as_text).any(|text| {
        let text = text.to_lowercase();
        self_ids.iter().filter(|id| !id.is_empty()).any(|id| {
            let needle = format!("@{}", id.to_lowercase());
            text.match_indices(&needle)
                .any(|(at, _)| ends_token(&text[at + needle.len()..]))
        })
    })
}

/// Whether a mention ends here: "@bobby" is not a mention of "bob".
fn ends_token(rest: &str) -> bool {
    !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_')
}

/// Strip `prefix` from the start of `text`, ignoring case.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let end = chars.next().map(|(i, _)| i).unwrap_or(text.len());
    Some(&text[end..])
}

/// A user message ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedUserMessage {
    pub text: String,
    /// Extra system-prompt text describing the conversation setting
    pub system_suffix: Option<String>,
}

/// Normalize one user text block.
///
/// A single leading `@self` mention is removed, then the text is prefixed
/// with `[YYYY-MM-DD HH:MM]` (UTC) and, in groups, `sender_name: `.
pub fn format_user_message(
    text: &str,
    is_group: bool,
    sender_name: &str,
    time: DateTime<Utc>,
    self_ids: &[String],
) -> FormattedUserMessage {
    let trimmed = text.trim_start();
    let body = self_ids
        .iter()
        .filter(|id| !id.is_empty())
        .find_map(|id| {
            strip_prefix_ignore_case(trimmed, &format!("@{id}")).filter(|rest| ends_token(rest))
        })
        .map(|rest| rest.trim_start_matches([',', ':']).trim_start())
        .unwrap_or(trimmed);

    let stamp = time.format("%Y-%m-%d %H:%M");
    let text = if is_group {
        format!("[{stamp}] {sender_name}: {body}")
    } else {
        format!("[{stamp}] {body}")
    };

    FormattedUserMessage {
        text: text.trim_end().to_string(),
        system_suffix: is_group.then(|| GROUP_CONTEXT.to_string()),
    }
}

/// Converts stored rows to completion-service wire messages.
pub struct MessageFormatter {
    audio: Arc<AudioNormalizer>,
}

impl MessageFormatter {
    pub fn new(audio: Arc<AudioNormalizer>) -> Self {
        Self { audio }
    }

    /// Format newest-first rows as chronological wire messages.
    ///
    /// A leading run of tool rows is dropped: a tool result whose call is not
    /// in the window must never be sent first.
    pub async fn format_messages_for_openai(&self, rows: &[Message]) -> Vec<WireMessage> {
        let chronological = rows
            .iter()
            .rev()
            .skip_while(|m| matches!(m.data, MessageData::Tool { .. }));

        let mut wire = Vec::with_capacity(rows.len());
        for message in chronological {
            match &message.data {
                MessageData::User { content } => {
                    let parts = self.user_parts(content).await;
                    if !parts.is_empty() {
                        wire.push(user_message(parts));
                    }
                }
                MessageData::Assistant { content } => {
                    if let Some(m) = assistant_message(content) {
                        wire.push(m);
                    }
                }
                MessageData::Tool { content } => {
                    wire.extend(content.iter().filter_map(|block| match block {
                        ContentBlock::ToolResult {
                            tool_call_id,
                            content,
                        } => Some(WireMessage::tool(tool_call_id.clone(), content.clone())),
                        _ => None,
                    }));
                }
            }
        }
        wire
    }

    async fn user_parts(&self, content: &[ContentBlock]) -> Vec<WirePart> {
        let mut parts = Vec::new();
        for block in content {
            match block {
                ContentBlock::Text { text } => parts.push(WirePart::text(text.clone())),
                ContentBlock::Image { data, mime_type } => parts.push(WirePart::image(mime_type, data)),
                ContentBlock::Video { data, mime_type } => parts.push(WirePart::video(mime_type, data)),
                ContentBlock::Audio { data, format } => parts.push(self.audio_part(data, format).await),
                ContentBlock::Quote { sender_id, content } => {
                    let mut lines = Vec::new();
                    let mut media = Vec::new();
                    flatten_quote(sender_id.as_deref(), content, 1, &mut lines, &mut media);
                    if !lines.is_empty() {
                        parts.push(WirePart::text(lines.join("\n")));
                    }
                    parts.extend(media);
                }
                ContentBlock::ToolCall { .. } | ContentBlock::ToolResult { .. } => {}
            }
        }
        parts
    }

    async fn audio_part(&self, data: &str, format: &str) -> WirePart {
        match self.audio.wire_part(data, format).await {
            Ok(part) => part,
            Err(e) => {
                warn!(error = %e, format, "Audio could not be prepared");
                WirePart::text(AUDIO_UNAVAILABLE)
            }
        }
    }
}

/// Flatten a quote into `> `-prefixed lines, collecting nested images.
fn flatten_quote(
    sender_id: Option<&str>,
    content: &[ContentBlock],
    depth: usize,
    lines: &mut Vec<String>,
    media: &mut Vec<WirePart>,
) {
    let marker = "> ".repeat(depth);
    if let Some(sender) = sender_id {
        lines.push(format!("{marker}{sender} wrote:"));
    }
    for block in content {
        match block {
            ContentBlock::Text { text } => {
                lines.extend(text.lines().map(|line| format!("{marker}{line}")));
            }
            ContentBlock::Image { data, mime_type } => {
                lines.push(format!("{marker}[image]"));
                media.push(WirePart::image(mime_type, data));
            }
            ContentBlock::Audio { .. } => lines.push(format!("{marker}[audio]")),
            ContentBlock::Video { .. } => lines.push(format!("{marker}[video]")),
            ContentBlock::Quote { sender_id, content } => {
                flatten_quote(sender_id.as_deref(), content, depth + 1, lines, media);
            }
            ContentBlock::ToolCall { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }
}

/// Plain text when every part is text, a part list otherwise.
fn user_message(parts: Vec<WirePart>) -> WireMessage {
    if parts.iter().all(|p| matches!(p, WirePart::Text { .. })) {
        let text = parts
            .into_iter()
            .filter_map(|p| match p {
                WirePart::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        WireMessage::user_text(text)
    } else {
        WireMessage::user_parts(parts)
    }
}

fn assistant_message(content: &[ContentBlock]) -> Option<WireMessage> {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for block in content {
        match block {
            ContentBlock::Text { text } => texts.push(text.as_str()),
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } => calls.push(WireToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => {}
        }
    }

    let message = WireMessage::assistant(Some(texts.join("\n")), calls);
    let empty = message.tool_calls.is_empty()
        && !matches!(&message.content, Some(WireContent::Text(t)) if !t.is_empty());
    (!empty).then_some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeTranscoder, msg};
    use crate::transcode::AudioTranscoder;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use chrono::TimeZone;
    use parley_core::provider::WireRole;

    fn ids() -> Vec<String> {
        vec!["parley".into(), "15551234".into()]
    }

    fn chat(enabled: bool, any: bool, mention: bool, reply: bool) -> Chat {
        Chat {
            is_enabled: enabled,
            respond_on_any: any,
            respond_on_mention: mention,
            respond_on_reply: reply,
            ..Chat::new("c")
        }
    }

    fn text(t: &str) -> Vec<ContentBlock> {
        vec![ContentBlock::text(t)]
    }

    #[test]
    fn gate_full_decision_table() {
        let mention = text("hey @Parley what's up");
        let plain = text("just chatting");

        for enabled in [false, true] {
            for any in [false, true] {
                for on_mention in [false, true] {
                    for on_reply in [false, true] {
                        for is_group in [false, true] {
                            for has_mention in [false, true] {
                                for quotes_us in [false, true] {
                                    let c = chat(enabled, any, on_mention, on_reply);
                                    let content = if has_mention { &mention } else { &plain };
                                    let quoted = if quotes_us { Some("15551234") } else { Some("someone") };

                                    let expected = enabled
                                        && (!is_group
                                            || any
                                            || (on_mention && has_mention)
                                            || (on_reply && quotes_us));
                                    assert_eq!(
                                        should_respond(&c, is_group, content, &ids(), quoted),
                                        expected,
                                        "enabled={enabled} any={any} mention={on_mention} reply={on_reply} \
                                         group={is_group} has_mention={has_mention} quotes_us={quotes_us}"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn gate_defaults() {
        let c = Chat::new("c");
        assert!(should_respond(&c, true, &text("@parley hi"), &ids(), None));
        assert!(!should_respond(&c, true, &text("hi all"), &ids(), Some("15551234")));
        assert!(!should_respond(&c, true, &text("hi all"), &ids(), None));
        assert!(should_respond(&c, false, &[], &ids(), None));
    }

    #[test]
    fn mention_of_a_longer_handle_does_not_open_the_gate() {
        let c = Chat::new("c");
        assert!(!should_respond(&c, true, &text("@parleybot can you help?"), &ids(), None));
        assert!(!should_respond(&c, true, &text("ping @parley_dev"), &ids(), None));
        assert!(should_respond(&c, true, &text("@parleybot or @parley?"), &ids(), None));
        assert!(should_respond(&c, true, &text("thanks @PARLEY"), &ids(), None));
    }

    #[test]
    fn mention_in_media_only_message_does_not_count() {
        let c = Chat::new("c");
        let content = vec![ContentBlock::Image {
            data: "@parley".into(),
            mime_type: "image/png".into(),
        }];
        assert!(!should_respond(&c, true, &content, &ids(), None));
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 12, 5, 42).unwrap()
    }

    #[test]
    fn private_message_gets_timestamp_only() {
        let f = format_user_message("hello", false, "alice", noon(), &ids());
        assert_eq!(f.text, "[2026-03-09 12:05] hello");
        assert!(f.system_suffix.is_none());
    }

    #[test]
    fn group_message_gets_sender_and_suffix() {
        let f = format_user_message("@PARLEY, what time is it?", true, "alice", noon(), &ids());
        assert_eq!(f.text, "[2026-03-09 12:05] alice: what time is it?");
        assert!(f.system_suffix.unwrap().contains("group chat"));
    }

    #[test]
    fn only_leading_whole_mention_is_stripped() {
        let f = format_user_message("ask @parley later", false, "a", noon(), &ids());
        assert_eq!(f.text, "[2026-03-09 12:05] ask @parley later");

        let f = format_user_message("@parleybot hi", false, "a", noon(), &ids());
        assert_eq!(f.text, "[2026-03-09 12:05] @parleybot hi");

        let f = format_user_message("@15551234 @parley hi", false, "a", noon(), &ids());
        assert_eq!(f.text, "[2026-03-09 12:05] @parley hi");
    }

    fn formatter_with(transcoder: Arc<dyn AudioTranscoder>, accepted: &[&str]) -> MessageFormatter {
        let accepted = accepted.iter().map(|f| f.to_string()).collect();
        MessageFormatter::new(Arc::new(AudioNormalizer::new(transcoder, accepted, "mp3")))
    }

    fn formatter() -> MessageFormatter {
        formatter_with(Arc::new(FakeTranscoder::ok(b"converted")), &["wav", "mp3"])
    }

    fn tool_row(id: &str) -> Message {
        msg(MessageData::tool_result(id, "result"))
    }

    #[tokio::test]
    async fn leading_tool_rows_are_stripped() {
        // Newest first.
        let rows = vec![
            msg(MessageData::assistant_text("answer")),
            msg(MessageData::user_text("question")),
            tool_row("call_2"),
            tool_row("call_1"),
        ];
        let wire = formatter().format_messages_for_openai(&rows).await;
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, WireRole::User);
        assert_eq!(wire[1].role, WireRole::Assistant);
    }

    #[tokio::test]
    async fn user_assistant_exchange_keeps_order() {
        let rows = vec![
            msg(MessageData::assistant_text("hi there")),
            msg(MessageData::user_text("hello")),
        ];
        let wire = formatter().format_messages_for_openai(&rows).await;
        assert_eq!(wire, vec![WireMessage::user_text("hello"), WireMessage::assistant(Some("hi there".into()), vec![])]);
    }

    #[tokio::test]
    async fn tool_calls_and_results_map_to_wire() {
        let rows = vec![
            msg(MessageData::tool_result("call_1", "12:00")),
            msg(MessageData::Assistant {
                content: vec![ContentBlock::ToolCall {
                    id: "call_1".into(),
                    name: "current_time".into(),
                    arguments: "{}".into(),
                }],
            }),
            msg(MessageData::user_text("time?")),
        ];
        let wire = formatter().format_messages_for_openai(&rows).await;
        assert_eq!(wire.len(), 3);
        assert!(wire[1].content.is_none());
        assert_eq!(wire[1].tool_calls[0].name, "current_time");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn plain_assistant_text_has_no_tool_calls() {
        let rows = vec![msg(MessageData::assistant_text("hi")), msg(MessageData::user_text("q"))];
        let wire = formatter().format_messages_for_openai(&rows).await;
        assert!(wire[1].tool_calls.is_empty());
    }

    #[tokio::test]
    async fn quotes_flatten_with_nested_images() {
        let content = vec![
            ContentBlock::Quote {
                sender_id: Some("bob".into()),
                content: vec![
                    ContentBlock::text("look at this"),
                    ContentBlock::Quote {
                        sender_id: None,
                        content: vec![ContentBlock::Image {
                            data: "AAAA".into(),
                            mime_type: "image/jpeg".into(),
                        }],
                    },
                ],
            },
            ContentBlock::text("what is it?"),
        ];
        let wire = formatter()
            .format_messages_for_openai(&[msg(MessageData::User { content })])
            .await;

        let Some(WireContent::Parts(parts)) = &wire[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts[0], WirePart::text("> bob wrote:\n> look at this\n> > [image]"));
        assert_eq!(parts[1], WirePart::image("image/jpeg", "AAAA"));
        assert_eq!(parts[2], WirePart::text("what is it?"));
    }

    #[tokio::test]
    async fn accepted_audio_passes_through() {
        let transcoder = Arc::new(FakeTranscoder::ok(b"converted"));
        let f = formatter_with(transcoder.clone(), &["wav", "mp3"]);
        let content = vec![ContentBlock::Audio {
            data: "UklGRg==".into(),
            format: "WAV".into(),
        }];
        let wire = f.format_messages_for_openai(&[msg(MessageData::User { content })]).await;
        assert_eq!(
            wire[0].content,
            Some(WireContent::Parts(vec![WirePart::audio("wav", "UklGRg==")]))
        );
        assert_eq!(transcoder.calls(), 0);
    }

    #[tokio::test]
    async fn other_audio_is_transcoded() {
        let transcoder = Arc::new(FakeTranscoder::ok(b"converted"));
        let f = formatter_with(transcoder.clone(), &["mp3"]);
        let content = vec![ContentBlock::Audio {
            data: BASE64.encode(b"ogg bytes"),
            format: "ogg".into(),
        }];
        let wire = f.format_messages_for_openai(&[msg(MessageData::User { content })]).await;
        assert_eq!(
            wire[0].content,
            Some(WireContent::Parts(vec![WirePart::audio("mp3", BASE64.encode(b"converted"))]))
        );
        assert_eq!(transcoder.calls(), 1);
    }

    #[tokio::test]
    async fn failed_transcode_degrades_to_placeholder() {
        let f = formatter_with(Arc::new(FakeTranscoder::failing()), &["mp3"]);
        let content = vec![ContentBlock::Audio {
            data: BASE64.encode(b"opus"),
            format: "opus".into(),
        }];
        let wire = f.format_messages_for_openai(&[msg(MessageData::User { content })]).await;
        assert_eq!(wire[0], WireMessage::user_text(AUDIO_UNAVAILABLE));
    }

    #[tokio::test]
    async fn tool_call_blocks_in_user_message_are_ignored() {
        let content = vec![
            ContentBlock::text("hi"),
            ContentBlock::ToolCall {
                id: "x".into(),
                name: "y".into(),
                arguments: "{}".into(),
            },
        ];
        let wire = formatter()
            .format_messages_for_openai(&[msg(MessageData::User { content })])
            .await;
        assert_eq!(wire, vec![WireMessage::user_text("hi")]);
    }
}
