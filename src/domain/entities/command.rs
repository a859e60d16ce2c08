use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::application::errors::BotError;
use crate::application::messaging::middleware::Context;

/// Handler result: an optional reply text
pub type HandlerResult = Result<Option<String>, BotError>;

/// Async handler shared by commands, bot commands, callbacks and the pipeline
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Represents a text command triggered by the configured prefix
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub aliases: BTreeSet<String>,
    pub usage: Option<String>,
    pub handler: Option<Handler>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            description: None,
            aliases: BTreeSet::new(),
            usage: None,
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler = Some(handler_fn(handler));
        self
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("aliases", &self.aliases)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// A command reachable through the inline bot, keyed by the first pattern token.
///
/// `"/search <query>"` is stored under the key `search`; the full pattern is
/// kept for help output.
#[derive(Clone)]
pub struct BotCommand {
    pub key: String,
    pub pattern: String,
    pub owner: String,
    pub handler: Handler,
}

impl BotCommand {
    pub fn new<F, Fut>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = pattern.into();
        let key = pattern
            .trim_start()
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            key,
            pattern,
            owner: String::new(),
            handler: handler_fn(handler),
        }
    }
}

/// Route for button presses whose data starts with `prefix`.
///
/// Restricted routes only dispatch when the presser holds a live grant in the
/// callback permission manager.
#[derive(Clone)]
pub struct CallbackRoute {
    pub prefix: String,
    pub owner: String,
    pub restricted: bool,
    pub handler: Handler,
}

impl CallbackRoute {
    pub fn new<F, Fut>(prefix: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            prefix: prefix.into(),
            owner: String::new(),
            restricted: false,
            handler: handler_fn(handler),
        }
    }

    pub fn restricted(mut self) -> Self {
        self.restricted = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_command_key_is_first_token() {
        let cmd = BotCommand::new("help topic", |_ctx| async { Ok(None) });
        assert_eq!(cmd.key, "help");
        assert_eq!(cmd.pattern, "help topic");

        let cmd = BotCommand::new("/search <query>", |_ctx| async { Ok(None) });
        assert_eq!(cmd.key, "search");
    }

    #[test]
    fn test_command_builder_collects_aliases() {
        let cmd = Command::new("help")
            .with_alias("h")
            .with_aliases(["?", "h"])
            .with_description("Show help");
        assert_eq!(cmd.aliases.len(), 2);
        assert!(cmd.handler.is_none());
        assert_eq!(cmd.description.as_deref(), Some("Show help"));
    }
}
