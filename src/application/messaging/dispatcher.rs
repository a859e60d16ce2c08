//! Message dispatcher - Routes events through middleware to registered handlers

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};

use futures::FutureExt;
use tracing::{debug, warn};

use super::middleware::{Context, MiddlewarePipeline};
use super::parser::CommandParser;
use crate::application::errors::BotError;
use crate::application::services::permissions::CallbackPermissionManager;
use crate::application::services::registry::SharedRegistry;
use crate::domain::entities::{handler_fn, Event, Handler, HandlerResult};
use crate::domain::traits::ErrorReporter;

/// What happened to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No command, bot command or callback route matched
    Unmatched,
    /// A handler (or a short-circuiting middleware) ran; carries its reply
    Handled(Option<String>),
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }

    pub fn reply(&self) -> Option<&str> {
        match self {
            Dispatch::Handled(reply) => reply.as_deref(),
            Dispatch::Unmatched => None,
        }
    }
}

/// Event dispatcher - resolves commands in the registry and runs them through
/// the middleware pipeline
pub struct Dispatcher {
    parser: CommandParser,
    registry: SharedRegistry,
    pipeline: MiddlewarePipeline,
    permissions: Arc<CallbackPermissionManager>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    pub fn new(
        prefix: impl Into<String>,
        registry: SharedRegistry,
        pipeline: MiddlewarePipeline,
        permissions: Arc<CallbackPermissionManager>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            parser: CommandParser::new(prefix),
            registry,
            pipeline,
            permissions,
            reporter,
        }
    }

    pub fn prefix(&self) -> &str {
        self.parser.prefix()
    }

    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.pipeline
    }

    /// Route a prefixed text command. True when a command matched, even if a
    /// middleware short-circuited or the handler failed.
    pub async fn process_command(&self, event: &Event) -> bool {
        self.route_command(event).await.is_handled()
    }

    /// Route a `/`-prefixed bot command.
    pub async fn process_bot_command(&self, event: &Event) -> bool {
        self.route_bot_command(event).await.is_handled()
    }

    /// Route a button press by its callback data.
    pub async fn process_callback(&self, event: &Event) -> bool {
        self.route_callback(event).await.is_handled()
    }

    /// Route any event: callbacks by data, then bot commands, then text commands.
    pub async fn dispatch(&self, event: &Event) -> Dispatch {
        if event.is_callback() {
            return self.route_callback(event).await;
        }
        if event.text.starts_with('/') {
            let outcome = self.route_bot_command(event).await;
            if outcome.is_handled() {
                return outcome;
            }
        }
        self.route_command(event).await
    }

    pub async fn route_command(&self, event: &Event) -> Dispatch {
        let Some(parsed) = self.parser.parse(&event.text) else {
            return Dispatch::Unmatched;
        };

        let found = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(&parsed.name);
        let Some((name, handler)) = found else {
            debug!(command = %parsed.name, "unknown command");
            return Dispatch::Unmatched;
        };

        let handler = handler.unwrap_or_else(|| not_implemented(&name));
        let ctx = Context::new(event.clone()).with_command(name.clone(), parsed.args);
        self.run(ctx, &handler, "dispatcher:command", &name).await
    }

    pub async fn route_bot_command(&self, event: &Event) -> Dispatch {
        let Some(parsed) = self.parser.parse_bot_command(&event.text) else {
            return Dispatch::Unmatched;
        };

        let handler = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bot_command(&parsed.name)
            .map(|cmd| cmd.handler.clone());
        let Some(handler) = handler else {
            debug!(command = %parsed.name, "unknown bot command");
            return Dispatch::Unmatched;
        };

        let ctx = Context::new(event.clone()).with_command(parsed.name.clone(), parsed.args);
        self.run(ctx, &handler, "dispatcher:bot_command", &parsed.name).await
    }

    pub async fn route_callback(&self, event: &Event) -> Dispatch {
        let Some(data) = event.data.as_deref() else {
            return Dispatch::Unmatched;
        };

        let route = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .match_callback(data)
            .map(|route| (route.prefix.clone(), route.restricted, route.handler.clone()));
        let Some((prefix, restricted, handler)) = route else {
            debug!(data, "no callback route");
            return Dispatch::Unmatched;
        };

        if restricted && !self.permissions.is_allowed(event.sender_id, data) {
            debug!(user = event.sender_id, data, "callback not permitted");
            return Dispatch::Unmatched;
        }

        let args = data[prefix.len()..]
            .split('_')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        let ctx = Context::new(event.clone()).with_command(prefix.clone(), args);
        self.run(ctx, &handler, "dispatcher:callback", &prefix).await
    }

    /// Run the pipeline around `handler`, catching errors and panics.
    async fn run(&self, ctx: Context, handler: &Handler, source: &str, name: &str) -> Dispatch {
        let event = ctx.event.clone();
        debug!(command = name, chat_id = event.chat_id, user = event.sender_id, "dispatching");

        let outcome = AssertUnwindSafe(self.pipeline.process(ctx, handler))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(reply)) => return Dispatch::Handled(reply),
            Ok(Err(e)) => e,
            Err(payload) => BotError::from_panic(payload),
        };

        warn!(command = name, source, error = %error, "handler failed");
        self.reporter.report(&error, source, Some(&event));
        Dispatch::Handled(None)
    }
}

fn not_implemented(name: &str) -> Handler {
    let reply = format!("Command {} not implemented", name);
    handler_fn(move |_ctx| {
        let reply = reply.clone();
        async move { HandlerResult::Ok(Some(reply)) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::middleware::{Middleware, Next};
    use crate::application::services::registry::CommandRegistry;
    use crate::domain::entities::{BotCommand, CallbackRoute, Command};
    use crate::infrastructure::reporting::CollectingReporter;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixture {
        dispatcher: Dispatcher,
        registry: SharedRegistry,
        permissions: Arc<CallbackPermissionManager>,
        reporter: Arc<CollectingReporter>,
    }

    fn fixture(pipeline: MiddlewarePipeline) -> Fixture {
        let registry = CommandRegistry::shared();
        let permissions = Arc::new(CallbackPermissionManager::new());
        let reporter = Arc::new(CollectingReporter::new());
        let dispatcher = Dispatcher::new(
            ".",
            registry.clone(),
            pipeline,
            permissions.clone(),
            reporter.clone(),
        );
        Fixture { dispatcher, registry, permissions, reporter }
    }

    fn echo_args(name: &str) -> Command {
        Command::new(name).with_handler(|ctx| async move {
            Ok(Some(format!("{}:{}", ctx.command.unwrap_or_default(), ctx.args.join(","))))
        })
    }

    #[tokio::test]
    async fn test_alias_resolves_to_canonical_command() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry
            .write()
            .unwrap()
            .register_command("core", echo_args("weather").with_alias("w"))
            .unwrap();

        let outcome = f.dispatcher.dispatch(&Event::new(1, 2, ".w London now")).await;
        assert_eq!(outcome.reply(), Some("weather:London,now"));

        assert!(f.dispatcher.process_command(&Event::new(1, 2, ".weather")).await);
        assert!(!f.dispatcher.process_command(&Event::new(1, 2, ".unknown")).await);
        assert!(!f.dispatcher.process_command(&Event::new(1, 2, "weather")).await);
    }

    #[tokio::test]
    async fn test_handler_error_is_reported_with_event() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry
            .write()
            .unwrap()
            .register_command(
                "core",
                Command::new("fail").with_handler(|_ctx| async { Err(BotError::Internal("boom".into())) }),
            )
            .unwrap();

        let event = Event::new(1, 2, ".fail");
        assert!(f.dispatcher.process_command(&event).await);

        let reports = f.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].source, "dispatcher:command");
        assert_eq!(reports[0].message, "Internal error: boom");
        assert_eq!(reports[0].event_id.as_deref(), Some(event.id.as_str()));
    }

    fn explode() -> HandlerResult {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry
            .write()
            .unwrap()
            .register_command(
                "core",
                Command::new("crash").with_handler(|_ctx| async { explode() }),
            )
            .unwrap();

        assert!(f.dispatcher.process_command(&Event::new(1, 2, ".crash")).await);
        assert_eq!(f.reporter.reports()[0].message, "Handler panicked: handler exploded");
    }

    #[tokio::test]
    async fn test_command_without_handler_replies_not_implemented() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry.write().unwrap().register_command("core", Command::new("todo")).unwrap();

        let outcome = f.dispatcher.dispatch(&Event::new(1, 2, ".todo")).await;
        assert_eq!(outcome.reply(), Some("Command todo not implemented"));
    }

    struct Block;

    #[async_trait]
    impl Middleware for Block {
        async fn process(&self, _ctx: Context, _next: Next<'_>) -> HandlerResult {
            Ok(Some("blocked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_short_circuit_still_counts_as_handled() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(Block);
        let f = fixture(pipeline);
        f.registry.write().unwrap().register_command("core", echo_args("ping")).unwrap();

        let outcome = f.dispatcher.dispatch(&Event::new(1, 2, ".ping")).await;
        assert_eq!(outcome, Dispatch::Handled(Some("blocked".to_string())));
    }

    #[tokio::test]
    async fn test_bot_command_strips_bot_name() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry
            .write()
            .unwrap()
            .register_bot_command(
                "core",
                BotCommand::new("/start <payload>", |ctx| async move { Ok(Some(ctx.args.join(" "))) }),
            )
            .unwrap();

        let outcome = f.dispatcher.dispatch(&Event::new(1, 2, "/start@MyBot ref42")).await;
        assert_eq!(outcome.reply(), Some("ref42"));
        assert!(!f.dispatcher.process_bot_command(&Event::new(1, 2, "/stop")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restricted_callback_requires_grant() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry
            .write()
            .unwrap()
            .register_callback(
                "core",
                CallbackRoute::new("menu_", |ctx| async move { Ok(Some(ctx.args.join("/"))) }).restricted(),
            )
            .unwrap();

        let press = Event::callback(1, 42, "menu_page_2");
        assert!(!f.dispatcher.process_callback(&press).await);

        f.permissions.allow(42, "menu_", Duration::from_secs(30));
        assert_eq!(f.dispatcher.dispatch(&press).await.reply(), Some("page/2"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!f.dispatcher.process_callback(&press).await);
    }

    #[tokio::test]
    async fn test_open_callback_and_missing_route() {
        let f = fixture(MiddlewarePipeline::new());
        f.registry
            .write()
            .unwrap()
            .register_callback("core", CallbackRoute::new("vote_", |_ctx| async { Ok(Some("ok".into())) }))
            .unwrap();

        assert!(f.dispatcher.process_callback(&Event::callback(1, 2, "vote_yes")).await);
        assert!(!f.dispatcher.process_callback(&Event::callback(1, 2, "poll_1")).await);
        assert!(!f.dispatcher.process_callback(&Event::new(1, 2, "vote_yes")).await);
    }
}
