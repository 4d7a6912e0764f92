pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// A message received from any platform
#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct IncomingMessage {
    /// Platform identifier (e.g., "telegram")
    pub platform: String,
    /// Platform-specific user ID as string
    pub user_id: String,
    /// Platform-specific chat/channel ID as string
    pub chat_id: String,
    /// Display name of the user
    pub user_name: String,
    /// Plain conversation text
    pub text: Option<String>,
    /// Text attached to richer messages (captions, quoted text)
    pub extended_text: Option<String>,
}

impl IncomingMessage {
    /// The first non-blank text field, trimmed.
    pub fn body(&self) -> &str {
        [self.text.as_deref(), self.extended_text.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
            .unwrap_or("")
    }
}

/// Branding merged into every message the bot sends.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ChannelInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Deliver without a notification sound.
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    pub channel: ChannelInfo,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>, channel: &ChannelInfo) -> Self {
        Self {
            text: text.into(),
            channel: channel.clone(),
        }
    }

    /// Final text including the channel footer, if any.
    pub fn render(&self) -> String {
        let name = match self.channel.name.as_deref() {
            Some(n) if !n.trim().is_empty() => n.trim(),
            _ => return self.text.clone(),
        };

        let mut out = format!("{}\n\n📢 {}", self.text, name);
        if let Some(url) = self.channel.url.as_deref().filter(|u| !u.trim().is_empty()) {
            out.push_str(&format!(" ({})", url.trim()));
        }
        out
    }
}

/// Outbound side of a chat connection.
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send(&self, chat_id: &str, message: OutgoingMessage) -> Result<()>;
}
