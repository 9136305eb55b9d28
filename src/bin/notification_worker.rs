//! # Notification Worker
//!
//! Standalone binary that runs the notification pipeline against PostgreSQL.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin notification-worker
//!
//! # Apply migrations, then run in production mode
//! NOTIFIER_ENV=production cargo run --bin notification-worker -- run --migrate
//!
//! # Print the effective configuration with credentials masked
//! cargo run --bin notification-worker -- check-config
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use booking_notifier::bootstrap::{BootstrapConfig, NotificationBootstrap};
use booking_notifier::database::{DatabaseConnection, DatabaseMigrations};
use booking_notifier::logging;

#[derive(Parser)]
#[command(name = "notification-worker")]
#[command(about = "Queue-driven appointment email notifications")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file (defaults to NOTIFIER_CONFIG_PATH or config/notifier.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment name (defaults to NOTIFIER_ENV or development)
    #[arg(short, long, global = true)]
    env: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue workers until Ctrl+C or SIGTERM
    Run {
        /// Apply pending migrations before starting
        #[arg(long)]
        migrate: bool,
    },
    /// Apply pending migrations and exit
    Migrate,
    /// Validate configuration and print it with credentials masked
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run { migrate: false });

    let bootstrap_config = BootstrapConfig {
        config_path: cli.config.config,
        environment_override: cli.config.env,
        run_migrations: matches!(command, Commands::Run { migrate: true }),
        auto_start: true,
    };

    let config_manager = match NotificationBootstrap::load_config(&bootstrap_config) {
        Ok(config_manager) => config_manager,
        Err(e) => {
            logging::init_structured_logging();
            error!(error = %e, "Failed to load configuration");
            return Err(e).context("loading configuration");
        }
    };
    logging::init_with_config(&config_manager.config().logging);

    match command {
        Commands::CheckConfig => {
            let rendered = serde_json::to_string_pretty(&config_manager.debug_config())?;
            println!("{rendered}");
            info!(environment = %config_manager.environment(), "✅ Configuration is valid");
            Ok(())
        }
        Commands::Migrate => {
            let connection = DatabaseConnection::connect(&config_manager.config().database)
                .await
                .context("connecting to database")?;
            let applied = DatabaseMigrations::run_all(connection.pool())
                .await
                .context("applying migrations")?;
            info!(applied = ?applied, "✅ Migrations complete");
            connection.close().await;
            Ok(())
        }
        Commands::Run { .. } => run(config_manager, bootstrap_config).await,
    }
}

async fn run(
    config_manager: std::sync::Arc<booking_notifier::ConfigManager>,
    bootstrap_config: BootstrapConfig,
) -> anyhow::Result<()> {
    info!("🚀 Starting notification worker...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   Environment: {}", config_manager.environment());

    let handle = NotificationBootstrap::bootstrap_with_config(config_manager, &bootstrap_config)
        .await
        .context("bootstrapping notification worker")?;

    info!(status = ?handle.status(), "🎉 Notification worker started");
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await?;
    info!("🛑 Shutdown signal received, initiating graceful shutdown...");

    if let Err(e) = handle.stop().await {
        error!("Failed to stop notification worker cleanly: {}", e);
    } else {
        info!("✅ Notification worker stopped");
    }

    info!("👋 Notification worker shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    #[cfg(unix)]
    tokio::select! {
        result = ctrl_c => {
            result.context("waiting for Ctrl+C")?;
            info!("Received Ctrl+C");
        },
        _ = terminate.recv() => {
            info!("Received SIGTERM");
        },
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("waiting for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
