use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use bot_kernel::application::messaging::{Dispatch, LoggingMiddleware, RateLimitMiddleware};
use bot_kernel::domain::traits::EventSource;
use bot_kernel::infrastructure::adapters::ConsoleSource;
use bot_kernel::infrastructure::config::Config;
use bot_kernel::plugins::{CorePlugin, PluginManager};
use bot_kernel::Kernel;

#[derive(Parser)]
#[command(name = "bot-kernel")]
#[command(about = "Extension runtime kernel for a message-driven bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Command prefix (overrides config)
    #[arg(short, long)]
    prefix: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the console host
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_bot(&cli.config, cli.prefix),
        Commands::Version => {
            println!("bot-kernel v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::InitConfig => init_config(),
    }
}

fn load_config(config_path: &str, prefix_override: Option<String>) -> Config {
    let mut config = if Path::new(config_path).exists() {
        Config::load(config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        Config::default()
    };
    config.apply_env();

    if let Some(prefix) = prefix_override {
        config.bot.prefix = prefix;
    }
    config
}

fn run_bot(config_path: &str, prefix_override: Option<String>) -> ExitCode {
    let config = load_config(config_path, prefix_override);
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!("Starting bot-kernel: {}", config.bot.name);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(async move {
        let mut builder = Kernel::builder(config.kernel_options()).middleware(LoggingMiddleware);
        let limits = &config.security.rate_limit;
        if limits.enabled {
            builder = builder.middleware(RateLimitMiddleware::new(limits.max_requests, limits.window_seconds));
        }
        let kernel = Arc::new(builder.build());

        if let Err(e) = kernel.start() {
            tracing::error!("Failed to start kernel: {}", e);
            return ExitCode::FAILURE;
        }

        let plugins = PluginManager::new(kernel.clone());
        if let Err(e) = plugins.load(CorePlugin::new(config.bot.name.clone())) {
            tracing::error!("Failed to load core plugin: {}", e);
            kernel.shutdown().await;
            return ExitCode::FAILURE;
        }
        tracing::info!("Plugin system initialized with {} plugins", plugins.list_plugins().len());

        let source: Arc<dyn EventSource> = Arc::new(ConsoleSource::stdin());
        run_console_bot(kernel.clone(), source).await;

        plugins.unload_all();
        kernel.shutdown().await;
        ExitCode::SUCCESS
    })
}

/// Pump events from `source` until it ends or ctrl-c arrives.
async fn run_console_bot(kernel: Arc<Kernel>, source: Arc<dyn EventSource>) {
    tracing::info!("Bot started: {} (prefix {:?})", source.name(), kernel.options().prefix);

    loop {
        let event = tokio::select! {
            event = source.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        };
        let Some(event) = event else {
            break;
        };

        let kernel = kernel.clone();
        let source = source.clone();
        tokio::spawn(async move {
            match kernel.dispatch(&event).await {
                Dispatch::Handled(Some(reply)) => source.reply(&event, &reply).await,
                Dispatch::Handled(None) => {}
                Dispatch::Unmatched => tracing::debug!(text = %event.preview(50), "ignored"),
            }
        });
    }
}

fn init_config() -> ExitCode {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to render config: {}", e);
            ExitCode::FAILURE
        }
    }
}
