//! The Parley agent: from an inbound chat message to the final reply.
//!
//! A message flows through these stages:
//!
//! 1. **Commands**: `!command args` runs an action directly
//! 2. **Gate**: disabled chats and unaddressed group chatter stop here
//! 3. **Context**: recent history is loaded, media the model cannot read
//!    is translated to text, and rows are formatted for the wire
//! 4. **Loop**: completion rounds with tool calls until the model is done
//!    or the depth guard stops it

pub mod agent;
pub mod formatter;
pub mod loop_runner;
pub mod transcode;
pub mod translator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, AgentBuilder, HandleOutcome};
pub use formatter::{FormattedUserMessage, MessageFormatter, format_user_message, should_respond};
pub use loop_runner::{DEPTH_LIMIT_WARNING, SILENT_PLACEHOLDER, Turn, TurnOutcome, TurnRunner};
pub use transcode::{AudioNormalizer, AudioTranscoder, FfmpegTranscoder, TranscodeError};
pub use translator::{ContentTranslator, content_hash, unsupported_placeholder};
