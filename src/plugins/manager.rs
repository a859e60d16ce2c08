//! Plugin manager - handles plugin lifecycle against the kernel

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::application::errors::PluginError;
use crate::application::kernel::Kernel;
use crate::plugins::trait_def::{Plugin, Registrar};

struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    tasks: Vec<String>,
}

/// Manages all plugins for the bot
pub struct PluginManager {
    kernel: Arc<Kernel>,
    plugins: Mutex<HashMap<String, LoadedPlugin>>,
}

impl PluginManager {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self {
            kernel,
            plugins: Mutex::new(HashMap::new()),
        }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    fn plugins(&self) -> MutexGuard<'_, HashMap<String, LoadedPlugin>> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a plugin, binding everything it registers to its name.
    ///
    /// On any registration or scheduling error the plugin's bindings and tasks
    /// are removed again and the error is returned.
    pub fn load<P: Plugin + 'static>(&self, plugin: P) -> Result<(), PluginError> {
        self.load_shared(Arc::new(plugin))
    }

    pub fn load_shared(&self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();

        // Held for the whole load so two loads of one name cannot interleave
        let mut plugins = self.plugins();
        if plugins.contains_key(&name) {
            return Err(PluginError::AlreadyLoaded(name));
        }

        let mut registrar = Registrar::new(&self.kernel, name.clone());
        let outcome = plugin.register(&mut registrar);
        let tasks = registrar.into_tasks();

        if let Err(e) = outcome {
            warn!(plugin = %name, error = %e, "plugin load failed, rolling back");
            self.release(&name, &tasks);
            return Err(e);
        }

        info!(plugin = %name, tasks = tasks.len(), "Loaded plugin");
        plugins.insert(name, LoadedPlugin { plugin, tasks });
        Ok(())
    }

    /// Unload a plugin: remove its bindings, cancel its tasks, run its cleanup.
    pub fn unload(&self, name: &str) -> Result<(), PluginError> {
        let loaded = self
            .plugins()
            .remove(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        self.release(name, &loaded.tasks);
        loaded.plugin.cleanup();
        info!(plugin = name, "Unloaded plugin");
        Ok(())
    }

    fn release(&self, owner: &str, tasks: &[String]) {
        self.kernel
            .registry()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister_module(owner);
        for id in tasks {
            self.kernel.scheduler().cancel_task(id);
        }
    }

    /// Unload every plugin
    pub fn unload_all(&self) {
        let names: Vec<String> = self.plugins().keys().cloned().collect();
        for name in names {
            if let Err(e) = self.unload(&name) {
                warn!(plugin = %name, error = %e, "unload failed");
            }
        }
    }

    /// Check if a plugin exists
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins().contains_key(name)
    }

    /// List all loaded plugins, sorted by name
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        let plugins = self.plugins();
        let mut list: Vec<PluginInfo> = plugins
            .iter()
            .map(|(name, loaded)| PluginInfo {
                name: name.clone(),
                description: loaded.plugin.description().to_string(),
                tasks: loaded.tasks.clone(),
                metadata: loaded.plugin.metadata(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}

/// Plugin information for listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub tasks: Vec<String>,
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::{ConflictKind, RegistryError};
    use crate::application::kernel::KernelOptions;
    use crate::domain::entities::{CallbackRoute, Command, Event};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct Weather {
        cleaned: Arc<AtomicBool>,
        ticks: Arc<AtomicUsize>,
    }

    impl Plugin for Weather {
        fn name(&self) -> &str {
            "weather"
        }

        fn description(&self) -> &str {
            "Forecasts"
        }

        fn register(&self, registrar: &mut Registrar<'_>) -> Result<(), PluginError> {
            registrar.command(
                Command::new("forecast")
                    .with_alias("fc")
                    .with_handler(|_ctx| async { Ok(Some("sunny".into())) }),
            )?;
            registrar.callback(CallbackRoute::new("wx_", |_ctx| async { Ok(None) }))?;
            let ticks = self.ticks.clone();
            registrar.interval_task(
                move || {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                Duration::from_secs(10),
            )?;
            Ok(())
        }

        fn cleanup(&self) {
            self.cleaned.store(true, Ordering::SeqCst);
        }
    }

    /// Registers one fresh command, then collides on `forecast`
    struct Copycat;

    impl Plugin for Copycat {
        fn name(&self) -> &str {
            "copycat"
        }

        fn description(&self) -> &str {
            "Steals names"
        }

        fn register(&self, registrar: &mut Registrar<'_>) -> Result<(), PluginError> {
            registrar.command(Command::new("mine"))?;
            registrar.task(|| async { Ok(()) }, Duration::from_secs(30))?;
            registrar.command(Command::new("forecast"))?;
            Ok(())
        }
    }

    fn weather() -> (Weather, Arc<AtomicBool>, Arc<AtomicUsize>) {
        let cleaned = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicUsize::new(0));
        let plugin = Weather {
            cleaned: cleaned.clone(),
            ticks: ticks.clone(),
        };
        (plugin, cleaned, ticks)
    }

    fn started_manager() -> PluginManager {
        let kernel = Arc::new(Kernel::new(KernelOptions {
            maintenance_interval: Duration::from_secs(3600),
            ..KernelOptions::default()
        }));
        kernel.start().unwrap();
        PluginManager::new(kernel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_and_unload_plugin() {
        let manager = started_manager();
        let (plugin, cleaned, ticks) = weather();
        manager.load(plugin).unwrap();

        assert!(manager.has_plugin("weather"));
        assert_eq!(manager.list_plugins()[0].tasks.len(), 1);
        let reply = manager.kernel().dispatch(&Event::new(1, 1, ".fc")).await;
        assert_eq!(reply.reply(), Some("sunny"));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        manager.unload("weather").unwrap();
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(!manager.kernel().dispatcher().process_command(&Event::new(1, 1, ".forecast")).await);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        // Only the kernel maintenance task is left
        assert_eq!(manager.kernel().scheduler().task_count(), 1);

        assert!(matches!(manager.unload("weather"), Err(PluginError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_conflicting_plugin_is_rolled_back() {
        let manager = started_manager();
        let (plugin, _, _) = weather();
        manager.load(plugin).unwrap();

        let err = manager.load(Copycat).unwrap_err();
        match err {
            PluginError::Registry(RegistryError::Conflict(conflict)) => {
                assert_eq!(conflict.command, "forecast");
                assert_eq!(conflict.owner, "weather");
                assert_eq!(conflict.kind, ConflictKind::Command);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(!manager.has_plugin("copycat"));
        let registry = manager.kernel().registry().read().unwrap();
        assert!(registry.resolve("mine").is_none());
        assert_eq!(registry.owner_of("forecast"), Some("weather"));
        drop(registry);
        // Maintenance plus the weather interval; the copycat one-shot is gone
        assert_eq!(manager.kernel().scheduler().task_count(), 2);
    }

    #[tokio::test]
    async fn test_double_load_rejected() {
        let manager = started_manager();
        manager.load(weather().0).unwrap();
        assert!(matches!(
            manager.load(weather().0),
            Err(PluginError::AlreadyLoaded(name)) if name == "weather"
        ));

        manager.unload_all();
        assert!(manager.list_plugins().is_empty());
    }
}
