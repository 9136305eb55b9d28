use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::appointments::{AppointmentStore, PgAppointmentStore};
use crate::config::ConfigManager;
use crate::database::DatabaseConnection;
use crate::error::{NotifierError, NotifierResult};
use crate::events::NotificationPublisher;
use crate::executor::NotificationExecutor;
use crate::ledger::{DeliveryLedger, PgDeliveryLedger};
use crate::mail::{BuiltinTemplateRenderer, EmailTransport, HttpMailTransport, MessageComposer};
use crate::messaging::{JobQueue, PgmqJobQueue};
use crate::orchestration::register_default_pipeline;
use crate::registry::QueueRegistry;

/// Shared system dependencies and configuration
///
/// Dependency injection container for the notification pipeline:
/// - Configuration manager
/// - Database connection pool (absent for in-memory setups)
/// - Delivery ledger, job queue and mail transport
/// - The sealed queue registry and the services built on it
pub struct SystemContext {
    /// System instance ID
    pub system_id: Uuid,

    pub config_manager: Arc<ConfigManager>,

    pub database_pool: Option<PgPool>,

    pub ledger: Arc<dyn DeliveryLedger>,

    pub job_queue: Arc<dyn JobQueue>,

    pub transport: Arc<dyn EmailTransport>,

    pub appointments: Arc<dyn AppointmentStore>,

    /// Sealed before the context is handed out
    pub registry: Arc<QueueRegistry>,

    pub executor: Arc<NotificationExecutor>,

    pub publisher: Arc<NotificationPublisher>,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system_id", &self.system_id)
            .field("environment", &self.config_manager.environment())
            .field(
                "database_pool",
                &self
                    .database_pool
                    .as_ref()
                    .map(|pool| format!("PgPool(size={})", pool.size()))
                    .unwrap_or_else(|| "None".to_string()),
            )
            .field("job_queue", &self.job_queue.provider_name())
            .field("transport", &self.transport.transport_name())
            .field("queues", &self.registry.queue_names())
            .finish()
    }
}

impl SystemContext {
    /// Create SystemContext with environment-aware configuration loading
    pub async fn new() -> NotifierResult<Arc<Self>> {
        info!("🔧 Initializing SystemContext with auto-detected environment configuration");
        let config_manager = ConfigManager::load()?;
        Self::from_config(config_manager).await
    }

    /// Connect to PostgreSQL and build the production component set
    pub async fn from_config(config_manager: Arc<ConfigManager>) -> NotifierResult<Arc<Self>> {
        let config = config_manager.config();
        info!(
            environment = %config_manager.environment(),
            "🔧 Initializing SystemContext from configuration"
        );

        let connection = DatabaseConnection::connect(&config.database)
            .await
            .map_err(|e| NotifierError::storage("connect", e.to_string()))?;
        let pool = connection.pool().clone();
        info!("✅ Database connection established");

        let ledger: Arc<dyn DeliveryLedger> = Arc::new(PgDeliveryLedger::new(pool.clone()));
        let job_queue: Arc<dyn JobQueue> =
            Arc::new(PgmqJobQueue::new_with_pool(pool.clone()).await);
        let transport: Arc<dyn EmailTransport> = Arc::new(HttpMailTransport::new(&config.mail)?);
        let appointments: Arc<dyn AppointmentStore> =
            Arc::new(PgAppointmentStore::new(pool.clone()));

        Self::from_components(
            config_manager,
            Some(pool),
            ledger,
            job_queue,
            transport,
            appointments,
        )
    }

    /// Assemble a context from explicit components
    ///
    /// Builds the executor and publisher, registers the default pipeline and
    /// seals the registry. Tests use this with the in-memory providers.
    pub fn from_components(
        config_manager: Arc<ConfigManager>,
        database_pool: Option<PgPool>,
        ledger: Arc<dyn DeliveryLedger>,
        job_queue: Arc<dyn JobQueue>,
        transport: Arc<dyn EmailTransport>,
        appointments: Arc<dyn AppointmentStore>,
    ) -> NotifierResult<Arc<Self>> {
        info!("🏗️ Creating system components");
        let config = config_manager.config();

        let composer = Arc::new(MessageComposer::new(
            config.mail.clone(),
            Arc::new(BuiltinTemplateRenderer::new()),
        )?);
        let executor = Arc::new(NotificationExecutor::new(
            ledger.clone(),
            transport.clone(),
            composer,
        ));

        let registry = Arc::new(QueueRegistry::new());
        register_default_pipeline(
            &registry,
            &config.queues,
            executor.clone(),
            appointments.clone(),
        )?;
        registry.seal()?;

        let publisher = Arc::new(NotificationPublisher::new(
            job_queue.clone(),
            registry.clone(),
            config.queues.clone(),
        ));

        let context = Self {
            system_id: Uuid::new_v4(),
            config_manager,
            database_pool,
            ledger,
            job_queue,
            transport,
            appointments,
            registry,
            executor,
            publisher,
        };

        info!(
            system_id = %context.system_id,
            queues = context.registry.queue_names().len(),
            "✅ SystemContext components created successfully"
        );
        Ok(Arc::new(context))
    }

    pub fn config_manager(&self) -> Arc<ConfigManager> {
        self.config_manager.clone()
    }

    pub fn database_pool(&self) -> Option<&PgPool> {
        self.database_pool.as_ref()
    }

    pub fn job_queue(&self) -> Arc<dyn JobQueue> {
        self.job_queue.clone()
    }

    pub fn registry(&self) -> Arc<QueueRegistry> {
        self.registry.clone()
    }

    pub fn executor(&self) -> Arc<NotificationExecutor> {
        self.executor.clone()
    }

    pub fn publisher(&self) -> Arc<NotificationPublisher> {
        self.publisher.clone()
    }

    /// Close the database pool, if any
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.database_pool {
            pool.close().await;
            info!("🛑 Database pool closed");
        }
    }
}
