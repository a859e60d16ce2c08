//! Kernel Integration Tests
//! Run with: cargo test --test kernel_integration_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;

use bot_kernel::application::messaging::{Context, Middleware, Next};
use bot_kernel::domain::entities::HandlerResult;
use bot_kernel::infrastructure::reporting::CollectingReporter;
use bot_kernel::plugins::CorePlugin;
use bot_kernel::{
    BotError, Command, Dispatch, Event, Kernel, KernelOptions, Plugin, PluginError, PluginManager, Registrar,
};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Drops every command whose args contain "forbidden"
struct Censor;

#[async_trait]
impl Middleware for Censor {
    async fn process(&self, ctx: Context, next: Next<'_>) -> HandlerResult {
        if ctx.args.iter().any(|a| a == "forbidden") {
            return Ok(Some("censored".to_string()));
        }
        next.run(ctx).await
    }
}

struct Notes {
    reminders: Arc<AtomicUsize>,
}

impl Plugin for Notes {
    fn name(&self) -> &str {
        "notes"
    }

    fn description(&self) -> &str {
        "Stores notes"
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> Result<(), PluginError> {
        let store = registrar.store();
        registrar.command(
            Command::new("note")
                .with_alias("n")
                .with_description("Save a note")
                .with_handler(move |ctx| {
                    let store = store.clone();
                    async move {
                        if ctx.args.is_empty() {
                            return Err(BotError::Parse("nothing to save".to_string()));
                        }
                        store.set("notes", &ctx.user_id.to_string(), &ctx.args.join(" ")).await?;
                        Ok(Some("saved".to_string()))
                    }
                }),
        )?;

        let reminders = self.reminders.clone();
        registrar.interval_task(
            move || {
                reminders.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            Duration::from_secs(60),
        )?;
        Ok(())
    }
}

fn kernel(reporter: Arc<CollectingReporter>) -> Arc<Kernel> {
    Arc::new(
        Kernel::builder(KernelOptions::default())
            .middleware(Censor)
            .reporter(reporter)
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_full_plugin_lifecycle() {
    ensure_init();
    let reporter = Arc::new(CollectingReporter::new());
    let kernel = kernel(reporter.clone());
    kernel.start().unwrap();

    let manager = PluginManager::new(kernel.clone());
    manager.load(CorePlugin::default()).unwrap();
    let reminders = Arc::new(AtomicUsize::new(0));
    manager.load(Notes { reminders: reminders.clone() }).unwrap();

    let outcome = kernel.dispatch(&Event::new(1, 7, ".n buy milk")).await;
    assert_eq!(outcome.reply(), Some("saved"));
    assert_eq!(
        kernel.store().get("notes", "7").await.unwrap().as_deref(),
        Some("buy milk")
    );

    // Middleware short-circuit still counts as handled
    let outcome = kernel.dispatch(&Event::new(1, 7, ".note forbidden")).await;
    assert_eq!(outcome, Dispatch::Handled(Some("censored".to_string())));

    // Handler errors are reported, not propagated
    let outcome = kernel.dispatch(&Event::new(1, 7, ".note")).await;
    assert_eq!(outcome, Dispatch::Handled(None));
    assert_eq!(reporter.reports()[0].source, "dispatcher:command");

    tokio::time::sleep(Duration::from_secs(125)).await;
    assert_eq!(reminders.load(Ordering::SeqCst), 2);

    manager.unload("notes").unwrap();
    assert_eq!(kernel.dispatch(&Event::new(1, 7, ".n again")).await, Dispatch::Unmatched);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(reminders.load(Ordering::SeqCst), 2);

    kernel.shutdown().await;
    assert_eq!(kernel.scheduler().task_count(), 0);
}

#[tokio::test]
async fn test_conflicting_plugin_leaves_no_trace() {
    ensure_init();
    let kernel = kernel(Arc::new(CollectingReporter::new()));
    kernel.start().unwrap();
    let manager = PluginManager::new(kernel.clone());
    manager.load(CorePlugin::default()).unwrap();

    struct Impostor;

    impl Plugin for Impostor {
        fn name(&self) -> &str {
            "impostor"
        }

        fn description(&self) -> &str {
            "Claims ping"
        }

        fn register(&self, registrar: &mut Registrar<'_>) -> Result<(), PluginError> {
            registrar.command(Command::new("pong"))?;
            registrar.command(Command::new("renamed").with_alias("ping"))?;
            Ok(())
        }
    }

    let err = manager.load(Impostor).unwrap_err();
    assert_eq!(err.to_string(), "Registration failed: command 'ping' already registered by 'core'");
    assert!(kernel.registry().read().unwrap().resolve("pong").is_none());
    assert_eq!(manager.list_plugins().len(), 1);

    let outcome = kernel.dispatch(&Event::new(1, 1, ".ping")).await;
    assert!(outcome.reply().unwrap().starts_with("Pong!"));
    kernel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_menu_grant_expires() {
    ensure_init();
    let kernel = kernel(Arc::new(CollectingReporter::new()));
    kernel.start().unwrap();
    let manager = PluginManager::new(kernel.clone());
    manager.load(CorePlugin::default()).unwrap();

    kernel.dispatch(&Event::new(1, 3, ".help")).await;
    let press = Event::callback(1, 3, "menu_1");
    assert!(kernel.dispatcher().process_callback(&press).await);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(!kernel.dispatcher().process_callback(&press).await);
    kernel.shutdown().await;
}
