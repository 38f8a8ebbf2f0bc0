//! `parley chat`: talk to the agent through the terminal transport.

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use parley_agent::{Agent, HandleOutcome, TurnOutcome};
use parley_config::AppConfig;
use parley_core::chat_handle::{ChatHandle, IncomingMessage};
use parley_core::message::ContentBlock;
use parley_store::SqliteStore;
use std::io::Write;
use std::sync::Arc;

use crate::terminal::{LineQueue, TerminalHandle};

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Conversation to join; history is kept per chat id
    #[arg(long, default_value = "terminal")]
    pub chat_id: String,

    /// Sender identity to speak as (add it to master_ids for owner actions)
    #[arg(long, default_value = "local-user")]
    pub sender: String,

    /// Behave like a group chat (mentions, response modes, name prefixes)
    #[arg(long)]
    pub group: bool,

    /// Speak as a group admin
    #[arg(long)]
    pub admin: bool,
}

/// The bot's identity in the terminal, mentionable as `@parley`.
const SELF_ID: &str = "parley";

pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;

    let provider = parley_providers::from_config(&config).map_err(|e| {
        anyhow::anyhow!(
            "{e}\n\n  Set PARLEY_API_KEY (or OPENROUTER_API_KEY / OPENAI_API_KEY),\n  \
             or add api_key to {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;

    let db_path = config.storage_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = SqliteStore::new(&db_path.to_string_lossy())
        .await
        .context("failed to open the database")?;
    tracing::debug!(path = %db_path.display(), "Conversation store opened");

    let model = config.default_model.clone();
    let agent = Agent::builder(config, Arc::new(store), Arc::new(provider)).build();

    let lines = LineQueue::stdin();
    let handle: Arc<dyn ChatHandle> = Arc::new(TerminalHandle::new(args.chat_id.clone(), lines.clone()));

    println!();
    println!("  Parley: terminal chat");
    println!("  Chat:    {}{}", args.chat_id, if args.group { " (group)" } else { "" });
    println!("  Sender:  {}{}", args.sender, if args.admin { " (admin)" } else { "" });
    println!("  Model:   {model}");
    println!();
    println!("  Type a message and press Enter. Mention the bot as @{SELF_ID} in groups.");
    println!("  Type 'exit' or press Ctrl+D to quit.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        let incoming = IncomingMessage {
            chat_id: args.chat_id.clone(),
            sender_ids: vec![args.sender.clone()],
            sender_name: Some(args.sender.clone()),
            sender_is_admin: args.admin,
            content: vec![ContentBlock::text(line)],
            is_group: args.group,
            timestamp: Utc::now(),
            self_ids: vec![SELF_ID.to_string()],
            quoted_sender_id: None,
            handle: handle.clone(),
        };

        match agent.handle_message(incoming).await {
            Ok(HandleOutcome::Disabled) => println!("  (the assistant is disabled here, use !enable)"),
            Ok(HandleOutcome::Responded(TurnOutcome::Failed(_))) => println!("  (turn failed)"),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(chat_id = %args.chat_id, error = %e, "Message handling failed");
                eprintln!("  [Error] {e}");
            }
        }
        println!();
    }

    println!();
    println!("  Goodbye! 👋");
    Ok(())
}
