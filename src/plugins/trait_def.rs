//! Plugin trait definitions

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::application::errors::{BotError, PluginError, RegistryError};
use crate::application::kernel::Kernel;
use crate::application::scheduler::TaskScheduler;
use crate::application::services::{CallbackPermissionManager, CommandRegistry, SharedRegistry};
use crate::domain::entities::{BotCommand, CallbackRoute, Command};
use crate::domain::traits::{ConfigProvider, KeyValueStore};
use crate::infrastructure::cache::SharedCache;

/// Core plugin trait that all plugins must implement
pub trait Plugin: Send + Sync {
    /// Unique identifier for the plugin; owner of everything it registers
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Bind commands, callbacks and background tasks.
    ///
    /// An error aborts the load and rolls back whatever was already bound.
    fn register(&self, registrar: &mut Registrar<'_>) -> Result<(), PluginError>;

    /// Optional: Cleanup resources when plugin is unloaded
    fn cleanup(&self) {}

    /// Optional: Get plugin metadata
    fn metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Registration surface handed to [`Plugin::register`].
///
/// Every binding is owned by the plugin being loaded, and every scheduled task
/// is remembered so unloading the plugin cancels it.
pub struct Registrar<'a> {
    kernel: &'a Kernel,
    owner: String,
    tasks: Vec<String>,
}

impl<'a> Registrar<'a> {
    pub(crate) fn new(kernel: &'a Kernel, owner: impl Into<String>) -> Self {
        Self {
            kernel,
            owner: owner.into(),
            tasks: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn command(&mut self, command: Command) -> Result<(), PluginError> {
        self.write_registry(|registry, owner| registry.register_command(owner, command))
    }

    pub fn bot_command(&mut self, command: BotCommand) -> Result<(), PluginError> {
        self.write_registry(|registry, owner| registry.register_bot_command(owner, command))
    }

    pub fn callback(&mut self, route: CallbackRoute) -> Result<(), PluginError> {
        self.write_registry(|registry, owner| registry.register_callback(owner, route))
    }

    fn write_registry<F>(&mut self, f: F) -> Result<(), PluginError>
    where
        F: FnOnce(&mut CommandRegistry, &str) -> Result<(), RegistryError>,
    {
        let mut registry = self
            .kernel
            .registry()
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut registry, &self.owner)?;
        Ok(())
    }

    pub fn interval_task<F, Fut>(&mut self, func: F, interval: Duration) -> Result<String, PluginError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let id = self.kernel.scheduler().add_interval_task(func, interval, None)?;
        self.tasks.push(id.clone());
        Ok(id)
    }

    pub fn daily_task<F, Fut>(&mut self, func: F, hour: u32, minute: u32) -> Result<String, PluginError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let id = self.kernel.scheduler().add_daily_task(func, hour, minute, None)?;
        self.tasks.push(id.clone());
        Ok(id)
    }

    pub fn task<F, Fut>(&mut self, func: F, delay: Duration) -> Result<String, PluginError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let id = self.kernel.scheduler().add_task(func, delay, None)?;
        self.tasks.push(id.clone());
        Ok(id)
    }

    pub fn registry(&self) -> SharedRegistry {
        self.kernel.registry().clone()
    }

    pub fn cache(&self) -> SharedCache<String, Value> {
        self.kernel.cache().clone()
    }

    pub fn permissions(&self) -> Arc<CallbackPermissionManager> {
        self.kernel.permissions().clone()
    }

    pub fn scheduler(&self) -> TaskScheduler {
        self.kernel.scheduler().clone()
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.kernel.store().clone()
    }

    pub fn config(&self) -> Arc<dyn ConfigProvider> {
        self.kernel.config().clone()
    }

    pub fn prefix(&self) -> &str {
        &self.kernel.options().prefix
    }

    pub(crate) fn into_tasks(self) -> Vec<String> {
        self.tasks
    }
}
