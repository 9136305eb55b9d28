//! # Notification Worker Bootstrap
//!
//! One entry point for every way the pipeline is run: the standalone
//! `notification-worker` binary, and tests that bring up a worker against
//! in-memory providers.
//!
//! Bootstrap order:
//!
//! 1. load configuration (explicit path/environment or auto-detected)
//! 2. build the [`SystemContext`] (pool, ledger, queue, transport, sealed registry)
//! 3. optionally apply the schema migrations
//! 4. create every stage and completion queue
//! 5. report ledger entries stuck in `sending`
//! 6. start the queue workers

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConfigManager;
use crate::database::DatabaseMigrations;
use crate::error::{NotifierError, NotifierResult};
use crate::orchestration::PipelineOrchestrator;
use crate::system_context::SystemContext;

/// Bootstrap configuration for the notification worker
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Configuration file (None = `NOTIFIER_CONFIG_PATH` or the default path)
    pub config_path: Option<PathBuf>,
    /// Environment override (None = auto-detect)
    pub environment_override: Option<String>,
    /// Apply pending migrations before starting
    pub run_migrations: bool,
    /// Start the queue workers immediately (vs manual polling)
    pub auto_start: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            environment_override: None,
            run_migrations: false,
            auto_start: true,
        }
    }
}

/// Point-in-time view of a running worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub environment: String,
    pub provider: String,
    pub queues: Vec<String>,
    pub workers: usize,
    pub database_pool_size: Option<u32>,
}

/// Lifecycle handle returned by [`NotificationBootstrap`]
pub struct NotificationWorkerHandle {
    pub context: Arc<SystemContext>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl std::fmt::Debug for NotificationWorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationWorkerHandle")
            .field("system_id", &self.context.system_id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl NotificationWorkerHandle {
    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.is_running(),
            environment: self.context.config_manager.environment().to_string(),
            provider: self.context.job_queue.provider_name().to_string(),
            queues: self.context.registry.queue_names(),
            workers: self.orchestrator.workers().len(),
            database_pool_size: self.context.database_pool().map(|pool| pool.size()),
        }
    }

    /// Stop the workers, then release the database pool
    pub async fn stop(&self) -> NotifierResult<()> {
        info!("🛑 BOOTSTRAP: Stopping notification worker");
        let result = self.orchestrator.shutdown().await;
        self.context.shutdown().await;
        result
    }
}

pub struct NotificationBootstrap;

impl NotificationBootstrap {
    /// Load configuration, connect and start the pipeline
    pub async fn bootstrap(config: BootstrapConfig) -> NotifierResult<NotificationWorkerHandle> {
        info!("🚀 BOOTSTRAP: Starting notification worker bootstrap");
        let config_manager = Self::load_config(&config)?;
        Self::bootstrap_with_config(config_manager, &config).await
    }

    /// Resolve configuration the way `bootstrap` does
    pub fn load_config(config: &BootstrapConfig) -> NotifierResult<Arc<ConfigManager>> {
        let config_manager = match (&config.config_path, &config.environment_override) {
            (None, None) => ConfigManager::load()?,
            (path, environment) => {
                let environment = environment
                    .clone()
                    .unwrap_or_else(ConfigManager::detect_environment);
                let path = path.clone().or_else(ConfigManager::default_config_path);
                ConfigManager::load_from_file_with_env(path.as_deref(), &environment)?
            }
        };
        info!(
            environment = %config_manager.environment(),
            "✅ BOOTSTRAP: Configuration loaded"
        );
        Ok(config_manager)
    }

    /// Connect with already-loaded configuration and start the pipeline
    pub async fn bootstrap_with_config(
        config_manager: Arc<ConfigManager>,
        config: &BootstrapConfig,
    ) -> NotifierResult<NotificationWorkerHandle> {
        let context = SystemContext::from_config(config_manager).await?;

        if config.run_migrations {
            let pool = context.database_pool().ok_or_else(|| {
                NotifierError::configuration("migrations require a database pool")
            })?;
            let applied = DatabaseMigrations::run_all(pool)
                .await
                .map_err(|e| NotifierError::storage("migrate", e.to_string()))?;
            info!(applied = ?applied, "✅ BOOTSTRAP: Migrations applied");
        }

        Self::bootstrap_with_context(context, config.auto_start).await
    }

    /// Start the pipeline on an already-built context
    pub async fn bootstrap_with_context(
        context: Arc<SystemContext>,
        auto_start: bool,
    ) -> NotifierResult<NotificationWorkerHandle> {
        let worker_config = context.config_manager.config().worker.clone();
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            context.job_queue(),
            context.registry(),
            worker_config.clone(),
        )?);

        orchestrator.ensure_queues().await?;
        Self::report_stale_claims(&context, &worker_config).await;

        if auto_start {
            orchestrator.start();
            info!("✅ BOOTSTRAP: Queue workers started");
        } else {
            info!("📋 BOOTSTRAP: Workers not auto-started - manual polling mode");
        }

        info!(
            system_id = %context.system_id,
            workers = orchestrator.workers().len(),
            "🎉 BOOTSTRAP: Notification worker ready"
        );
        Ok(NotificationWorkerHandle {
            context,
            orchestrator,
        })
    }

    /// Entries claimed longer ago than a job may run were abandoned mid-send
    async fn report_stale_claims(context: &SystemContext, worker: &crate::config::WorkerConfig) {
        match context.ledger.stale_claims(worker.visibility_timeout()).await {
            Ok(stale) if stale.is_empty() => {}
            Ok(stale) => {
                for entry in &stale {
                    warn!(
                        key = %entry.key(),
                        attempts = entry.attempts,
                        updated_at = %entry.updated_at,
                        "⚠️ BOOTSTRAP: Delivery left in sending state; inspect before resending"
                    );
                }
                warn!(count = stale.len(), "⚠️ BOOTSTRAP: Stale delivery claims found");
            }
            Err(e) => warn!(error = %e, "Could not check for stale delivery claims"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_config_default() {
        let config = BootstrapConfig::default();
        assert!(config.config_path.is_none());
        assert!(config.environment_override.is_none());
        assert!(!config.run_migrations);
        assert!(config.auto_start);
    }

    #[tokio::test]
    async fn test_bootstrap_with_in_memory_context() {
        let pipeline = crate::test_utils::InMemoryPipeline::new().unwrap();
        let handle = NotificationBootstrap::bootstrap_with_context(pipeline.context.clone(), false)
            .await
            .unwrap();

        let status = handle.status();
        assert!(!status.running);
        assert_eq!(status.provider, "in_memory");
        assert_eq!(status.queues.len(), 6);
        // six job workers plus two completion workers
        assert_eq!(status.workers, 8);
        assert!(status.database_pool_size.is_none());

        handle.stop().await.unwrap();
    }
}
