//! bot-kernel - extension runtime kernel for a message-driven bot
//!
//! Layers:
//! - `domain`: events, command bindings and collaborator traits
//! - `application`: registry, middleware, dispatcher, scheduler and the kernel
//! - `infrastructure`: cache, config, storage, reporters and event sources
//! - `plugins`: plugin trait, lifecycle manager and the built-in `core` plugin

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;

pub use application::errors::{BotError, CommandConflictError, PluginError, RegistryError, SchedulerError};
pub use application::kernel::{Kernel, KernelBuilder, KernelOptions};
pub use application::messaging::Dispatch;
pub use domain::entities::{BotCommand, CallbackRoute, Command, Event};
pub use plugins::{Plugin, PluginManager, Registrar};
