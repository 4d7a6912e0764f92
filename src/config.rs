use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::platform::ChannelInfo;

/// Environment variable holding the Gemini credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_gemini_config")]
    pub gemini: GeminiConfig,
    #[serde(default = "default_commands_config")]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub channel: ChannelInfo,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Empty means every user may talk to the bot.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Taken from the environment, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl GeminiConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandsConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_prefix() -> String {
    ".".to_string()
}

fn default_gemini_config() -> GeminiConfig {
    GeminiConfig {
        model: default_model(),
        base_url: default_base_url(),
        api_key: None,
    }
}

fn default_commands_config() -> CommandsConfig {
    CommandsConfig {
        prefix: default_prefix(),
    }
}

/// Blank values count as unset.
fn normalize_api_key(raw: Option<String>) -> Option<String> {
    raw.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

impl Config {
    /// Load the TOML file at `path` and pick up the credential from the
    /// environment. A missing credential is not an error here; the command
    /// handler reports it to the chat instead.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content, std::env::var(API_KEY_ENV).ok())
    }

    pub fn from_toml(content: &str, api_key: Option<String>) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        config.gemini.api_key = normalize_api_key(api_key);
        config.gemini.base_url = config.gemini.base_url.trim_end_matches('/').to_string();

        if config.commands.prefix.trim().is_empty() {
            anyhow::bail!("commands.prefix must not be empty");
        }

        Ok(config)
    }
}
