//! Console front end: reads chat messages from stdin and prints replies.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_droid::commands;
use chat_droid::config::resolve_config;
use chat_droid::{ConversationOrchestrator, InMemoryHistoryStore, InferenceClient};

/// Relay chat commands to a local Ollama model.
#[derive(Debug, Parser)]
#[command(name = "chat-droid", version, about)]
struct Cli {
    /// Path to a chat-droid.yaml config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// User id the messages are attributed to.
    #[arg(long, default_value = "console")]
    user: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = chat_droid::logging::init_tracing().context("failed to initialise logging")?;

    let config = resolve_config(cli.config.as_deref()).context("failed to load configuration")?;
    let client = InferenceClient::from_config(&config).context("failed to create inference client")?;

    if client.health_check().await {
        tracing::info!(endpoint = %client.endpoint(), "inference endpoint reachable");
    } else {
        tracing::warn!(endpoint = %client.endpoint(), "inference endpoint unreachable");
        eprintln!("⚠️ Ollama is not reachable at {}; is `ollama serve` running?", client.endpoint());
    }

    let orchestrator = ConversationOrchestrator::new(
        config,
        Arc::new(client),
        Arc::new(InMemoryHistoryStore::new()),
    );

    println!(
        "✅ Chat Droid is online as `{}`. Type `!help` for commands. (logs: {})",
        cli.user,
        log_path.display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if commands::is_model_ask(&line) {
            println!("🤖 Thinking...");
        }
        if let Some(reply) = commands::dispatch(&orchestrator, &cli.user, &line).await {
            println!("{reply}");
        }
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
