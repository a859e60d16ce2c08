//! Built-in `core` plugin: ping, help, /start and the help menu buttons

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::application::errors::{BotError, PluginError};
use crate::domain::entities::{BotCommand, CallbackRoute, Command};
use crate::plugins::trait_def::{Plugin, Registrar};

/// How long the help menu buttons stay usable after `help`
pub const MENU_GRANT: Duration = Duration::from_secs(60);

/// Callback prefix of the help menu
pub const MENU_PREFIX: &str = "menu_";

pub struct CorePlugin {
    bot_name: String,
}

impl CorePlugin {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
        }
    }
}

impl Default for CorePlugin {
    fn default() -> Self {
        Self::new("bot-kernel")
    }
}

impl Plugin for CorePlugin {
    fn name(&self) -> &str {
        "core"
    }

    fn description(&self) -> &str {
        "Built-in commands"
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> Result<(), PluginError> {
        registrar.command(
            Command::new("ping")
                .with_alias("p")
                .with_description("Check that the bot is alive")
                .with_handler(|ctx| async move {
                    let lag = Utc::now() - ctx.event.timestamp;
                    Ok(Some(format!("Pong! ({} ms)", lag.num_milliseconds().max(0))))
                }),
        )?;

        // Weak: the handler lives inside the registry it reads
        let registry = Arc::downgrade(&registrar.registry());
        let permissions = registrar.permissions();
        let prefix = registrar.prefix().to_string();
        registrar.command(
            Command::new("help")
                .with_alias("h")
                .with_description("List available commands")
                .with_handler(move |ctx| {
                    let entries = registry
                        .upgrade()
                        .map(|registry| registry.read().unwrap_or_else(PoisonError::into_inner).describe())
                        .unwrap_or_default();
                    permissions.allow(ctx.user_id, MENU_PREFIX, MENU_GRANT);

                    let mut text = String::from("Available commands:");
                    for (name, description) in entries {
                        if description.is_empty() {
                            text.push_str(&format!("\n{}{}", prefix, name));
                        } else {
                            text.push_str(&format!("\n{}{} - {}", prefix, name, description));
                        }
                    }
                    async move { Ok(Some(text)) }
                }),
        )?;

        let store = registrar.store();
        let bot_name = self.bot_name.clone();
        let help_hint = format!("{}help", registrar.prefix());
        registrar.bot_command(BotCommand::new("/start [payload]", move |ctx| {
            let store = store.clone();
            let greeting = format!("Welcome to {}! Send {} to see what I can do.", bot_name, help_hint);
            async move {
                let key = ctx.user_id.to_string();
                if store.get("core", &key).await?.is_none() {
                    store.set("core", &key, &ctx.event.timestamp.to_rfc3339()).await?;
                }
                Ok(Some(greeting))
            }
        }))?;

        registrar.callback(
            CallbackRoute::new(MENU_PREFIX, |ctx| async move {
                match ctx.args.first() {
                    Some(page) => Ok(Some(format!("Menu page {}", page))),
                    None => Err(BotError::Parse("menu callback without a page".to_string())),
                }
            })
            .restricted(),
        )?;

        Ok(())
    }
}
