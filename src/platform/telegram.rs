use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, info, warn};

use crate::commands::mariam::MariamCommand;
use crate::commands::{help_text, parse_command, Command};
use crate::platform::{ChannelInfo, ChatSession, IncomingMessage, OutgoingMessage};

/// Telegram rejects messages above 4096 chars.
const MAX_MESSAGE_LEN: usize = 4000;

/// Shared state handed to every update
pub struct BotState {
    pub mariam: MariamCommand,
    pub allowed_user_ids: Vec<u64>,
    pub prefix: String,
    pub channel: ChannelInfo,
}

impl BotState {
    fn is_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }

    fn help_message(&self) -> OutgoingMessage {
        OutgoingMessage::new(help_text(&self.prefix), &self.channel)
    }
}

/// Split long messages for Telegram's length limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // max_len is narrower than this char; emit it whole
        if end == start {
            end = start + 1;
            while !text.is_char_boundary(end) {
                end += 1;
            }
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// `ChatSession` backed by the Telegram Bot API.
pub struct TelegramSession {
    bot: Bot,
}

impl TelegramSession {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatSession for TelegramSession {
    async fn send(&self, chat_id: &str, message: OutgoingMessage) -> Result<()> {
        let chat_id: i64 = chat_id
            .parse()
            .with_context(|| format!("Invalid Telegram chat id: {}", chat_id))?;

        for chunk in split_message(&message.render(), MAX_MESSAGE_LEN) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .disable_notification(message.channel.silent)
                .await
                .context("Failed to send Telegram message")?;
        }
        Ok(())
    }
}

/// Run the Telegram bot platform
pub async fn run(bot_token: &str, state: Arc<BotState>) -> Result<()> {
    let bot = Bot::new(bot_token);

    info!("Starting Telegram platform...");

    let handler = Update::filter_message()
        .filter(|msg: Message, state: Arc<BotState>| {
            msg.from
                .as_ref()
                .map(|user| state.is_allowed(user.id.0))
                .unwrap_or(false)
        })
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let user = msg.from.as_ref()?;
    Some(IncomingMessage {
        platform: "telegram".to_string(),
        user_id: user.id.0.to_string(),
        chat_id: msg.chat.id.0.to_string(),
        user_name: user.first_name.clone(),
        text: msg.text().map(str::to_string),
        extended_text: msg.caption().map(str::to_string),
    })
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let incoming = match to_incoming(&msg) {
        Some(m) => m,
        None => return Ok(()),
    };

    let command = match parse_command(incoming.body(), &state.prefix) {
        Some(c) => c,
        None => {
            debug!("Ignoring non-command message from {}", incoming.user_id);
            return Ok(());
        }
    };

    info!(
        "Telegram command {:?} from {} ({})",
        command, incoming.user_name, incoming.user_id
    );

    match command {
        Command::Help => {
            let session = TelegramSession::new(bot);
            if let Err(e) = session
                .send(&incoming.chat_id, state.help_message())
                .await
            {
                warn!("Failed to send help to {}: {:#}", incoming.chat_id, e);
            }
        }
        Command::Mariam => {
            bot.send_chat_action(msg.chat.id, teloxide::types::ChatAction::Typing)
                .await
                .ok();

            let session = TelegramSession::new(bot);
            state
                .mariam
                .handle(&session, &incoming.chat_id, &incoming)
                .await;
        }
    }

    Ok(())
}
