//! # PostgreSQL Message Queue Provider (pgmq-rs)
//!
//! Durable [`JobQueue`] backed by the pgmq-rs crate. Visibility timeouts and
//! read counts come straight from pgmq; dead-lettering uses pgmq's archive
//! table so exhausted jobs stay queryable.

use std::time::Duration;

use async_trait::async_trait;
use pgmq::PGMQueue;
use tracing::{debug, info, warn};

use super::errors::{MessagingError, MessagingResult};
use super::traits::{validate_queue_name, JobQueue, MessageId, ReceivedJob};

/// pgmq-rs based job queue
#[derive(Debug, Clone)]
pub struct PgmqJobQueue {
    pgmq: PGMQueue,
}

impl PgmqJobQueue {
    /// Create new pgmq queue using connection string
    pub async fn new(database_url: &str) -> MessagingResult<Self> {
        info!("Connecting to pgmq");

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| MessagingError::database_connection(e.to_string()))?;

        info!("Connected to pgmq");
        Ok(Self { pgmq })
    }

    /// Create new pgmq queue using an existing connection pool
    pub async fn new_with_pool(pool: sqlx::PgPool) -> Self {
        debug!("Creating pgmq queue with shared connection pool");
        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self { pgmq }
    }

    /// Get reference to underlying connection pool
    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pgmq.connection
    }
}

#[async_trait]
impl JobQueue for PgmqJobQueue {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        validate_queue_name(queue_name)?;
        debug!(queue = %queue_name, "Creating queue");

        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;

        Ok(())
    }

    async fn enqueue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
    ) -> MessagingResult<MessageId> {
        let message_id = self
            .pgmq
            .send(queue_name, payload)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;

        debug!(queue = %queue_name, message_id, "Message sent");
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<ReceivedJob>> {
        let vt = i32::try_from(visibility_timeout.as_secs()).map_err(|_| {
            MessagingError::configuration("visibility_timeout", "timeout exceeds i32 seconds")
        })?;
        let qty = i32::try_from(max_messages).unwrap_or(i32::MAX);

        let messages = self
            .pgmq
            .read_batch::<serde_json::Value>(queue_name, Some(vt), qty)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?
            .unwrap_or_default();

        Ok(messages
            .into_iter()
            .map(|msg| ReceivedJob {
                queue_name: queue_name.to_string(),
                message_id: msg.msg_id,
                payload: msg.message,
                read_count: u32::try_from(msg.read_ct).unwrap_or(0),
                enqueued_at: msg.enqueued_at,
            })
            .collect())
    }

    async fn ack(&self, queue_name: &str, message_id: MessageId) -> MessagingResult<()> {
        let deleted = self
            .pgmq
            .delete(queue_name, message_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;

        if deleted == 0 {
            return Err(MessagingError::message_not_found(queue_name, message_id));
        }
        Ok(())
    }

    async fn dead_letter(&self, queue_name: &str, message_id: MessageId) -> MessagingResult<()> {
        warn!(queue = %queue_name, message_id, "Archiving message");

        let archived = self
            .pgmq
            .archive(queue_name, message_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "archive", e.to_string()))?;

        if archived == 0 {
            return Err(MessagingError::message_not_found(queue_name, message_id));
        }
        Ok(())
    }

    async fn queue_depth(&self, queue_name: &str) -> MessagingResult<u64> {
        validate_queue_name(queue_name)?;

        // Name is validated above, so interpolating it into the table name is safe.
        let query = format!("SELECT COUNT(*) FROM pgmq.q_{queue_name}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(self.pool())
            .await
            .map_err(|e| MessagingError::database_query("queue_depth", e.to_string()))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        let (ok,): (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(self.pool())
            .await?;
        Ok(ok == 1)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
