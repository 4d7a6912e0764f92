use std::sync::Arc;

use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::commands::extract_query;
use crate::config::{Config, API_KEY_ENV};
use crate::llm::{GeminiClient, GeminiError, Generation, TextGenerator};
use crate::platform::{ChannelInfo, ChatSession, IncomingMessage, OutgoingMessage};

pub const THINKING: &str = "⏳ Mariam is thinking...";

/// Wrap the user's query in Mariam's persona.
pub fn build_prompt(query: &str) -> String {
    format!(
        "You are Mariam, a friendly and helpful AI assistant integrated into a WhatsApp bot. \
         Answer the user's query concisely and clearly. User query: \"{}\"",
        query
    )
}

/// Terminal result of one invocation; each maps to exactly one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    MissingCredential,
    EmptyQuery,
    Blocked(String),
    EmptyResponse,
    Quiet,
    Answer(String),
    Failed(String),
}

impl Outcome {
    fn into_text(self) -> String {
        match self {
            Outcome::MissingCredential => format!(
                "❌ Configuration error: Gemini API key is missing. \
                 Bot owner needs to set the `{}` environment variable.",
                API_KEY_ENV
            ),
            Outcome::EmptyQuery => "🤔 Please ask Mariam a question!\n\n\
                 Example: `.mariam What is the weather like today?`"
                .to_string(),
            Outcome::Blocked(reason) => format!(
                "❌ Mariam couldn't process that request due to safety restrictions ({}). \
                 Please try a different query.",
                reason
            ),
            Outcome::EmptyResponse => {
                "❌ Mariam received an unexpected empty response from the AI. Please try again."
                    .to_string()
            }
            Outcome::Quiet => {
                "🤔 Mariam seems to be quiet right now. Try asking again!".to_string()
            }
            Outcome::Answer(text) => text,
            Outcome::Failed(reason) => {
                format!("❌ Sorry, Mariam encountered an error: {}", reason)
            }
        }
    }
}

impl From<Generation> for Outcome {
    fn from(generation: Generation) -> Self {
        match generation {
            Generation::Blocked(reason) => Outcome::Blocked(reason),
            Generation::Empty => Outcome::EmptyResponse,
            Generation::Text(text) if text.trim().is_empty() => Outcome::Quiet,
            Generation::Text(text) => Outcome::Answer(text),
        }
    }
}

impl From<GeminiError> for Outcome {
    fn from(err: GeminiError) -> Self {
        Outcome::Failed(err.to_string())
    }
}

/// The `mariam` command: forwards a question to Gemini and relays the answer.
pub struct MariamCommand {
    /// `None` when the credential was missing at startup.
    generator: Option<Arc<dyn TextGenerator>>,
    channel: ChannelInfo,
}

impl MariamCommand {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, channel: ChannelInfo) -> Self {
        Self { generator, channel }
    }

    pub fn from_config(config: &Config) -> Self {
        let generator = GeminiClient::from_config(&config.gemini)
            .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);
        if generator.is_none() {
            warn!(
                "{} is not set; the mariam command will report a configuration error",
                API_KEY_ENV
            );
        }
        Self::new(generator, config.channel.clone())
    }

    /// Run the command. Never fails: every problem becomes a chat message.
    pub async fn handle(
        &self,
        session: &dyn ChatSession,
        chat_id: &str,
        message: &IncomingMessage,
    ) {
        let span = tracing::info_span!(
            "mariam",
            invocation = %Uuid::new_v4(),
            chat_id = %chat_id
        );
        self.run(session, chat_id, message).instrument(span).await
    }

    async fn run(&self, session: &dyn ChatSession, chat_id: &str, message: &IncomingMessage) {
        let generator = match &self.generator {
            Some(g) => g,
            None => {
                error!("{} is not set", API_KEY_ENV);
                self.reply(session, chat_id, Outcome::MissingCredential).await;
                return;
            }
        };

        let query = extract_query(message.body());
        if query.is_empty() {
            self.reply(session, chat_id, Outcome::EmptyQuery).await;
            return;
        }

        self.send(session, chat_id, THINKING).await;

        let outcome = match Self::ask(&**generator, query).await {
            Ok(generation) => Outcome::from(generation),
            Err(e) => {
                error!("Error interacting with Gemini: {}", e);
                Outcome::from(e)
            }
        };

        match &outcome {
            Outcome::Blocked(reason) => warn!("Gemini request blocked. Reason: {}", reason),
            Outcome::EmptyResponse => {
                warn!("Gemini response is empty or has no candidate content")
            }
            Outcome::Answer(_) => info!("Received response from Gemini"),
            _ => {}
        }

        self.reply(session, chat_id, outcome).await;
    }

    async fn ask(generator: &dyn TextGenerator, query: &str) -> Result<Generation, GeminiError> {
        debug!("Sending prompt to Gemini: {:?}", query);
        let response = generator.generate(&build_prompt(query)).await?;
        response.interpret()
    }

    async fn reply(&self, session: &dyn ChatSession, chat_id: &str, outcome: Outcome) {
        self.send(session, chat_id, outcome.into_text()).await;
    }

    async fn send(&self, session: &dyn ChatSession, chat_id: &str, text: impl Into<String>) {
        let message = OutgoingMessage::new(text, &self.channel);
        if let Err(e) = session.send(chat_id, message).await {
            warn!("Failed to send message to {}: {:#}", chat_id, e);
        }
    }
}
