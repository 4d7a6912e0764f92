pub mod mariam;

/// Commands the bot answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Mariam,
    Help,
}

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mariam" => Some(Command::Mariam),
            "start" | "help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// Recognise a command in the first token of `text`. Both the configured
/// prefix and Telegram's `/` are accepted, and `/cmd@botname` is handled.
pub fn parse_command(text: &str, prefix: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;

    let name = first
        .strip_prefix(prefix)
        .or_else(|| first.strip_prefix('/'))?;
    let name = name.split('@').next().unwrap_or(name);

    Command::from_name(name)
}

/// Everything after the command token, trimmed.
pub fn extract_query(body: &str) -> &str {
    body.trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

pub fn help_text(prefix: &str) -> String {
    format!(
        "Hello! I'm Mariam, your AI assistant.\n\n\
         Commands:\n\
         {prefix}mariam <question> - Ask Mariam anything"
    )
}
