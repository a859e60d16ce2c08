//! Plugin system for the kernel
//!
//! Plugins register commands, callbacks and scheduled tasks through a
//! [`Registrar`]; the [`PluginManager`] owns their lifecycle.

pub mod builtin;
pub mod manager;
pub mod trait_def;

pub use builtin::CorePlugin;
pub use manager::{PluginInfo, PluginManager};
pub use trait_def::{Plugin, Registrar};
