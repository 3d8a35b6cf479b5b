//! discord-relay CLI entry point.
//!
//! Provides `start` to run the relay until interrupted and `send` to post a
//! single message on behalf of the configured agent.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use discord_relay::config::{config_dir, load_config, logs_dir_for, Config};
use discord_relay::memory::sqlite::SqliteMemoryStore;
use discord_relay::memory::{InMemoryStore, MemoryStore};
use discord_relay::platform::OutboundContent;
use discord_relay::relay::handlers::{FnHandler, InboundMessage};
use discord_relay::relay::{RelayManager, RoomKey};
use discord_relay::runtime::{StaticRuntime, DM_CHANNEL_SETTING, TOKEN_SETTING};

/// discord-relay — poll channels and relay agent messages.
#[derive(Parser)]
#[command(name = "discord-relay", version, about)]
struct Cli {
    /// Path to `config.toml` (default: `~/.discord-relay/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Poll the direct-message channel and log inbound messages until Ctrl-C.
    Start,
    /// Send one message and print the recorded memory as JSON.
    Send {
        /// Target channel.
        #[arg(long)]
        channel: String,
        /// Message text.
        #[arg(long)]
        text: String,
        /// Message id to reply to.
        #[arg(long)]
        reply_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.toml"),
    };

    match cli.command {
        Command::Start => handle_start(&config_path).await,
        Command::Send {
            channel,
            text,
            reply_to,
        } => handle_send(&config_path, &channel, text, reply_to).await,
    }
}

/// Run the relay until Ctrl-C.
async fn handle_start(config_path: &std::path::Path) -> anyhow::Result<()> {
    let logs_dir = logs_dir_for(config_path);
    let _logging_guard = discord_relay::logging::init_production(&logs_dir)?;

    let config = load_config(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let runtime = build_runtime(&config).await?;
    let relay = RelayManager::start(runtime, config.relay_config());

    relay.add_message_handler(
        RoomKey::DirectMessage,
        Arc::new(FnHandler::new(|inbound: &InboundMessage| {
            info!(
                room = %inbound.room,
                message_id = %inbound.message.id,
                author = %inbound.message.author.username,
                text = %inbound.message.content,
                "inbound message"
            );
            Ok(())
        })),
    );

    info!(agent_id = %config.agent.id, "relay running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    relay.shutdown();
    info!("relay stopped");
    Ok(())
}

/// Send a single message and print the resulting memory record.
async fn handle_send(
    config_path: &std::path::Path,
    channel: &str,
    text: String,
    reply_to: Option<String>,
) -> anyhow::Result<()> {
    discord_relay::logging::init_cli();

    let config = load_config(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let runtime = build_runtime(&config).await?;
    let agent_id = config.agent.id.clone();
    let relay = RelayManager::start(runtime, config.relay_config());

    relay.set_active_channel(&agent_id, channel).await;
    let content = OutboundContent {
        text,
        in_reply_to: reply_to,
    };
    let result = relay.send_message(&agent_id, content).await;
    relay.cleanup(&agent_id);
    relay.shutdown();

    let record = result.context("send failed")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Assemble the agent runtime: token from the environment, configured store.
async fn build_runtime(config: &Config) -> anyhow::Result<Arc<StaticRuntime>> {
    let memory: Arc<dyn MemoryStore> = match &config.memory.database {
        Some(path) => Arc::new(
            SqliteMemoryStore::open(path)
                .await
                .with_context(|| format!("failed to open memory database {}", path.display()))?,
        ),
        None => Arc::new(InMemoryStore::new()),
    };

    let mut runtime = StaticRuntime::new(config.agent.id.clone(), memory);
    if let Ok(token) = std::env::var(&config.platform.token_env) {
        runtime = runtime.with_setting(TOKEN_SETTING, token);
    }
    if let Ok(channel) = std::env::var(DM_CHANNEL_SETTING) {
        runtime = runtime.with_setting(DM_CHANNEL_SETTING, channel);
    }
    Ok(Arc::new(runtime))
}
