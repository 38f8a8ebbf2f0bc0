//! Audio transcoding through an external codec utility.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parley_core::provider::WirePart;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Transcoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Transcoding timed out after {0}s")]
    Timeout(u64),

    #[error("Transcoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),
}

/// Converts raw audio bytes to another encoding.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(&self, data: &[u8], target_format: &str) -> Result<Vec<u8>, TranscodeError>;
}

/// Brings audio into an encoding the completion service accepts.
///
/// Formats in the accepted list pass through untouched; anything else is
/// decoded, transcoded to the target format and re-encoded.
pub struct AudioNormalizer {
    transcoder: Arc<dyn AudioTranscoder>,
    accepted_formats: Vec<String>,
    target_format: String,
}

impl AudioNormalizer {
    pub fn new(
        transcoder: Arc<dyn AudioTranscoder>,
        accepted_formats: Vec<String>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            transcoder,
            accepted_formats,
            target_format: target_format.into(),
        }
    }

    /// An `input_audio` part for base64 `data` recorded as `format`.
    pub async fn wire_part(&self, data: &str, format: &str) -> Result<WirePart, TranscodeError> {
        let format = format.to_lowercase();
        if self.accepted_formats.iter().any(|f| f.eq_ignore_ascii_case(&format)) {
            return Ok(WirePart::audio(format, data));
        }

        let raw = BASE64.decode(data)?;
        let converted = self.transcoder.transcode(&raw, &self.target_format).await?;
        Ok(WirePart::audio(self.target_format.clone(), BASE64.encode(converted)))
    }
}

/// Pipes audio through `ffmpeg`, letting it detect the input encoding.
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(&self, data: &[u8], target_format: &str) -> Result<Vec<u8>, TranscodeError> {
        debug!(program = %self.program, bytes = data.len(), target_format, "Transcoding audio");

        let mut child = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-i", "pipe:0", "-f", target_format, "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin concurrently so a full stdout pipe cannot deadlock us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("stdin not captured"))?;
        let input = data.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::Timeout(self.timeout.as_secs()))??;

        // A broken pipe just means ffmpeg stopped reading; its exit status decides.
        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "Transcoder closed stdin early");
        }

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}
