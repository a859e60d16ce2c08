//! Kernel - one owned instance of every runtime component
//!
//! Plugins never reach for globals: the kernel hands out shared handles to the
//! registry, cache, permission manager, scheduler and collaborators.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::application::errors::SchedulerError;
use crate::application::messaging::{Dispatch, Dispatcher, Middleware, MiddlewarePipeline};
use crate::application::scheduler::TaskScheduler;
use crate::application::services::{CallbackPermissionManager, CommandRegistry, SharedRegistry};
use crate::domain::entities::Event;
use crate::domain::traits::{ConfigProvider, ErrorReporter, KeyValueStore};
use crate::infrastructure::cache::{SharedCache, TtlCache, DEFAULT_MAX_SIZE, DEFAULT_TTL};
use crate::infrastructure::config::MemoryConfig;
use crate::infrastructure::reporting::TracingReporter;
use crate::infrastructure::storage::MemoryStore;

/// Runtime knobs for a [`Kernel`]
#[derive(Debug, Clone, PartialEq)]
pub struct KernelOptions {
    pub prefix: String,
    pub cache_max_size: usize,
    pub cache_default_ttl: Duration,
    pub maintenance_interval: Duration,
    pub dedup_window: Duration,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            prefix: ".".to_string(),
            cache_max_size: DEFAULT_MAX_SIZE,
            cache_default_ttl: DEFAULT_TTL,
            maintenance_interval: Duration::from_secs(300),
            dedup_window: Duration::from_secs(60),
        }
    }
}

/// Builder for [`Kernel`]; middleware is fixed once the kernel is built
pub struct KernelBuilder {
    options: KernelOptions,
    pipeline: MiddlewarePipeline,
    reporter: Option<Arc<dyn ErrorReporter>>,
    store: Option<Arc<dyn KeyValueStore>>,
    config: Option<Arc<dyn ConfigProvider>>,
}

impl KernelBuilder {
    pub fn new(options: KernelOptions) -> Self {
        Self {
            options,
            pipeline: MiddlewarePipeline::new(),
            reporter: None,
            store: None,
            config: None,
        }
    }

    /// Append a middleware; the first added runs outermost.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.pipeline.add(middleware);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Kernel {
        let options = self.options;
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(TracingReporter::new(options.dedup_window)));
        let registry = CommandRegistry::shared();
        let permissions = Arc::new(CallbackPermissionManager::new());

        let dispatcher = Dispatcher::new(
            options.prefix.clone(),
            registry.clone(),
            self.pipeline,
            permissions.clone(),
            reporter.clone(),
        );

        Kernel {
            cache: TtlCache::shared(options.cache_max_size, options.cache_default_ttl),
            scheduler: TaskScheduler::new(reporter.clone()),
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            config: self.config.unwrap_or_else(|| Arc::new(MemoryConfig::new())),
            options,
            registry,
            dispatcher,
            permissions,
            reporter,
            maintenance: Mutex::new(None),
        }
    }
}

/// The extension runtime kernel
pub struct Kernel {
    options: KernelOptions,
    registry: SharedRegistry,
    dispatcher: Dispatcher,
    cache: SharedCache<String, Value>,
    permissions: Arc<CallbackPermissionManager>,
    scheduler: TaskScheduler,
    reporter: Arc<dyn ErrorReporter>,
    store: Arc<dyn KeyValueStore>,
    config: Arc<dyn ConfigProvider>,
    /// Id of the periodic cache and grant cleanup task while started
    maintenance: Mutex<Option<String>>,
}

impl Kernel {
    pub fn builder(options: KernelOptions) -> KernelBuilder {
        KernelBuilder::new(options)
    }

    /// Kernel with default options, no middleware and in-memory collaborators
    pub fn new(options: KernelOptions) -> Self {
        KernelBuilder::new(options).build()
    }

    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &SharedCache<String, Value> {
        &self.cache
    }

    pub fn permissions(&self) -> &Arc<CallbackPermissionManager> {
        &self.permissions
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    /// Id of the running maintenance task, if the kernel is started
    pub fn maintenance_task(&self) -> Option<String> {
        self.maintenance.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start the scheduler and the periodic maintenance task.
    /// Calling it on a running kernel does nothing.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.scheduler.is_running() {
            return Ok(());
        }
        self.scheduler.start();

        let cache = self.cache.clone();
        let permissions = self.permissions.clone();
        let id = self.scheduler.add_interval_task(
            move || {
                let expired = cache.lock().unwrap_or_else(PoisonError::into_inner).cleanup_expired();
                let grants = permissions.cleanup();
                debug!(expired, grants, "maintenance pass");
                futures::future::ready(Ok(()))
            },
            self.options.maintenance_interval,
            None,
        )?;
        *self.maintenance.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);

        info!(prefix = %self.options.prefix, "Kernel started");
        Ok(())
    }

    /// Route one event and return what happened.
    pub async fn dispatch(&self, event: &Event) -> Dispatch {
        self.dispatcher.dispatch(event).await
    }

    /// Stop every scheduled task and clear transient state.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.maintenance.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.permissions.clear_all();
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        info!("Kernel stopped");
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelOptions::default())
    }
}
