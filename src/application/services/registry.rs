//! Command registry - name bindings with ownership-aware conflict detection
//!
//! Three namespaces are kept apart: text commands (plus their aliases), bot
//! commands keyed by their first pattern token, and callback routes keyed by
//! data prefix. Every binding records the plugin that owns it so a plugin can
//! be unloaded without touching anybody else's bindings.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::application::errors::{CommandConflictError, ConflictKind, RegistryError};
use crate::domain::entities::{BotCommand, CallbackRoute, Command, Handler};

/// Registry shared between the kernel, the dispatcher and the plugin manager
pub type SharedRegistry = Arc<RwLock<CommandRegistry>>;

/// Command registry for managing available commands
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    /// alias -> canonical command name
    aliases: HashMap<String, String>,
    bot_commands: HashMap<String, BotCommand>,
    callbacks: HashMap<String, CallbackRoute>,
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn conflict(command: &str, owner: &str, kind: ConflictKind) -> RegistryError {
    CommandConflictError {
        command: command.to_string(),
        owner: owner.to_string(),
        kind,
    }
    .into()
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Bind `command` and its aliases to `owner`.
    ///
    /// Fails without changing anything if the name or an alias is held by a
    /// different owner, or if an alias would shadow an existing command name.
    /// Re-registering a name already owned by `owner` replaces it.
    pub fn register_command(&mut self, owner: &str, mut command: Command) -> Result<(), RegistryError> {
        let name = command.name.clone();
        validate_name(&name)?;

        if let Some(existing) = self.commands.get(&name) {
            if existing.owner != owner {
                return Err(conflict(&name, &existing.owner, ConflictKind::Command));
            }
        }
        if let Some(alias_owner) = self.alias_owner(&name) {
            if alias_owner != owner {
                return Err(conflict(&name, alias_owner, ConflictKind::Alias));
            }
        }

        command.aliases.remove(&name);
        for alias in &command.aliases {
            validate_name(alias)?;
            if let Some(existing) = self.commands.get(alias) {
                return Err(conflict(alias, &existing.owner, ConflictKind::Command));
            }
            if let Some(alias_owner) = self.alias_owner(alias) {
                if alias_owner != owner {
                    return Err(conflict(alias, alias_owner, ConflictKind::Alias));
                }
            }
        }

        // Validation passed; commit
        if let Some(previous) = self.commands.remove(&name) {
            for alias in previous.aliases {
                if self.aliases.get(&alias) == Some(&name) {
                    self.aliases.remove(&alias);
                }
            }
        }
        if let Some(target) = self.aliases.remove(&name) {
            if let Some(cmd) = self.commands.get_mut(&target) {
                cmd.aliases.remove(&name);
            }
        }
        for alias in &command.aliases {
            if let Some(old_target) = self.aliases.insert(alias.clone(), name.clone()) {
                if old_target != name {
                    if let Some(cmd) = self.commands.get_mut(&old_target) {
                        cmd.aliases.remove(alias);
                    }
                }
            }
        }

        tracing::debug!(command = %name, owner, aliases = ?command.aliases, "registered command");
        command.owner = owner.to_string();
        self.commands.insert(name, command);
        Ok(())
    }

    /// Bind a bot command under its key token.
    pub fn register_bot_command(&mut self, owner: &str, mut command: BotCommand) -> Result<(), RegistryError> {
        validate_name(&command.key)?;

        if let Some(existing) = self.bot_commands.get(&command.key) {
            if existing.owner != owner {
                return Err(conflict(&command.key, &existing.owner, ConflictKind::BotCommand));
            }
        }

        tracing::debug!(command = %command.key, pattern = %command.pattern, owner, "registered bot command");
        command.owner = owner.to_string();
        self.bot_commands.insert(command.key.clone(), command);
        Ok(())
    }

    /// Bind a callback route under its data prefix.
    pub fn register_callback(&mut self, owner: &str, mut route: CallbackRoute) -> Result<(), RegistryError> {
        validate_name(&route.prefix)?;

        if let Some(existing) = self.callbacks.get(&route.prefix) {
            if existing.owner != owner {
                return Err(conflict(&route.prefix, &existing.owner, ConflictKind::Callback));
            }
        }

        tracing::debug!(prefix = %route.prefix, owner, restricted = route.restricted, "registered callback");
        route.owner = owner.to_string();
        self.callbacks.insert(route.prefix.clone(), route);
        Ok(())
    }

    /// Canonical command name for a direct name or an alias
    pub fn resolve(&self, name_or_alias: &str) -> Option<String> {
        if self.commands.contains_key(name_or_alias) {
            return Some(name_or_alias.to_string());
        }
        self.aliases.get(name_or_alias).cloned()
    }

    /// Resolve and return the canonical name with its handler
    pub fn lookup(&self, name_or_alias: &str) -> Option<(String, Option<Handler>)> {
        let name = self.resolve(name_or_alias)?;
        let handler = self.commands.get(&name)?.handler.clone();
        Some((name, handler))
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn bot_command(&self, key: &str) -> Option<&BotCommand> {
        self.bot_commands.get(key)
    }

    /// Route with the longest prefix matching `data`
    pub fn match_callback(&self, data: &str) -> Option<&CallbackRoute> {
        self.callbacks
            .values()
            .filter(|route| data.starts_with(route.prefix.as_str()))
            .max_by_key(|route| route.prefix.len())
    }

    pub fn owner_of(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(|c| c.owner.as_str())
    }

    fn alias_owner(&self, alias: &str) -> Option<&str> {
        let target = self.aliases.get(alias)?;
        self.owner_of(target)
    }

    /// Remove every binding owned by `owner`; returns how many were removed.
    pub fn unregister_module(&mut self, owner: &str) -> usize {
        let before = self.commands.len() + self.bot_commands.len() + self.callbacks.len();

        self.commands.retain(|_, cmd| cmd.owner != owner);
        let commands = &self.commands;
        self.aliases.retain(|_, target| commands.contains_key(target));
        self.bot_commands.retain(|_, cmd| cmd.owner != owner);
        self.callbacks.retain(|_, route| route.owner != owner);

        let removed = before - (self.commands.len() + self.bot_commands.len() + self.callbacks.len());
        if removed > 0 {
            tracing::info!(owner, removed, "unregistered plugin bindings");
        }
        removed
    }

    /// Sorted names of the text commands owned by `owner`
    pub fn commands_of(&self, owner: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .values()
            .filter(|c| c.owner == owner)
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn all(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Sorted `(name, description)` pairs for help listings
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .commands
            .values()
            .map(|c| (c.name.clone(), c.description.clone().unwrap_or_default()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
