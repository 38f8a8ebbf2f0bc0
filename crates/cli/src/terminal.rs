//! Terminal transport: stdin in, stdout out.
//!
//! One background task reads stdin line by line. Both the chat loop and
//! confirmation prompts pull from the same line queue, so a prompt asked in
//! the middle of a turn simply consumes the next line typed.

use async_trait::async_trait;
use parley_core::chat_handle::ChatHandle;
use parley_core::error::ChatError;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};

/// Lines typed on stdin, shared between the chat loop and prompts.
#[derive(Clone)]
pub struct LineQueue {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl LineQueue {
    /// Start reading stdin in the background.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });
        Self::from_receiver(rx)
    }

    pub fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// The next line, or `None` once stdin is closed.
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// Whether a line typed at the prompt means yes.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// A chat handle that prints to the terminal.
pub struct TerminalHandle {
    chat_id: String,
    lines: LineQueue,
}

impl TerminalHandle {
    pub fn new(chat_id: impl Into<String>, lines: LineQueue) -> Self {
        Self {
            chat_id: chat_id.into(),
            lines,
        }
    }

    fn print(prefix: &str, text: &str) {
        for line in text.lines() {
            println!("  {prefix} {line}");
        }
    }
}

#[async_trait]
impl ChatHandle for TerminalHandle {
    fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn send(&self, text: &str) -> Result<(), ChatError> {
        Self::print("Parley >", text);
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result<(), ChatError> {
        Self::print("Parley ↩", text);
        Ok(())
    }

    async fn react(&self, emoji: &str) -> Result<(), ChatError> {
        println!("  [Parley reacted {emoji}]");
        Ok(())
    }

    async fn poll(&self, question: &str, options: &[String]) -> Result<(), ChatError> {
        Self::print("Poll >", question);
        for (i, option) in options.iter().enumerate() {
            println!("    {}. {option}", i + 1);
        }
        Ok(())
    }

    async fn confirm(&self, prompt: &str) -> Result<bool, ChatError> {
        Self::print("Confirm >", prompt);
        println!("  Confirm > (y/n)");
        match self.lines.next_line().await {
            Some(answer) => Ok(is_yes(&answer)),
            None => Err(ChatError::ConnectionLost("stdin closed".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        for answer in ["y", "Y", " yes ", "YES"] {
            assert!(is_yes(answer), "{answer}");
        }
        for answer in ["", "n", "no", "yep", "sure"] {
            assert!(!is_yes(answer), "{answer}");
        }
    }

    #[tokio::test]
    async fn confirm_reads_the_next_line() {
        let (tx, rx) = mpsc::channel(4);
        let handle = TerminalHandle::new("terminal", LineQueue::from_receiver(rx));

        tx.send("y".into()).await.unwrap();
        tx.send("nope".into()).await.unwrap();
        assert!(handle.confirm("Clear history?").await.unwrap());
        assert!(!handle.confirm("Clear history?").await.unwrap());

        drop(tx);
        assert!(matches!(
            handle.confirm("Clear history?").await,
            Err(ChatError::ConnectionLost(_))
        ));
    }
}
