//! Command parser - Extracts command tokens and arguments from event text

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// `/name`, `/name@SomeBot`, followed by optional arguments
static BOT_COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/([^\s@/]+)(?:@\S*)?(?:\s+(.*))?$").expect("bot command regex is valid")
});

/// A command token and its whitespace-separated arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Parses prefixed text into commands
#[derive(Debug, Clone)]
pub struct CommandParser {
    command_prefix: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Parse a prefixed text command; `None` when the prefix is missing or
    /// nothing follows it.
    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        if self.command_prefix.is_empty() {
            return None;
        }
        let rest = text.strip_prefix(self.command_prefix.as_str())?;

        // The token must follow the prefix directly
        if rest.starts_with(char::is_whitespace) {
            return None;
        }

        let mut parts = rest.split_whitespace();
        let name = parts.next()?.to_string();
        let args = parts.map(str::to_string).collect();

        Some(ParsedCommand { name, args })
    }

    /// Parse a `/`-prefixed bot command, dropping any `@botname` suffix.
    pub fn parse_bot_command(&self, text: &str) -> Option<ParsedCommand> {
        let caps = BOT_COMMAND_RE.captures(text.trim_end())?;
        let name = caps.get(1)?.as_str().to_string();
        let args = caps
            .get(2)
            .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Some(ParsedCommand { name, args })
    }
}
