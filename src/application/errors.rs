//! Application layer errors

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Errors raised by handlers, middleware and scheduled work at runtime.
///
/// These never escape the kernel: the dispatcher and the scheduler catch them
/// and forward them to the configured [`ErrorReporter`](crate::domain::traits::ErrorReporter).
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Handler panicked: {0}")]
    Panic(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Build a `Panic` error from the payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        BotError::Panic(message)
    }
}

/// Which namespace a registration collided in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Command,
    Alias,
    BotCommand,
    Callback,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictKind::Command => "command",
            ConflictKind::Alias => "alias",
            ConflictKind::BotCommand => "bot command",
            ConflictKind::Callback => "callback",
        };
        f.write_str(s)
    }
}

/// A name is already bound to a different owning plugin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} '{command}' already registered by '{owner}'")]
pub struct CommandConflictError {
    pub command: String,
    pub owner: String,
    pub kind: ConflictKind,
}

/// Registration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Conflict(#[from] CommandConflictError),

    #[error("Invalid command name: {0:?}")]
    InvalidName(String),
}

/// Daily schedule outside `00:00..=23:59`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid daily schedule {hour}:{minute}: hour must be 0-23 and minute 0-59")]
pub struct InvalidScheduleError {
    pub hour: u32,
    pub minute: u32,
}

/// Scheduler errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidSchedule(#[from] InvalidScheduleError),

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Task id already used: {0}")]
    DuplicateTask(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Plugin lifecycle errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin '{0}' already loaded")]
    AlreadyLoaded(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),
}
