mod commands;
mod config;
mod llm;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::mariam::MariamCommand;
use crate::config::Config;
use crate::platform::telegram::{self, BotState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mariam_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.gemini.model);
    info!("  Gemini API key configured: {}", config.gemini.has_api_key());
    info!("  Command prefix: {}", config.commands.prefix);
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);

    let state = Arc::new(BotState {
        mariam: MariamCommand::from_config(&config),
        allowed_user_ids: config.telegram.allowed_user_ids.clone(),
        prefix: config.commands.prefix.clone(),
        channel: config.channel.clone(),
    });

    info!("Bot is starting...");
    telegram::run(&config.telegram.bot_token, state).await?;

    Ok(())
}
