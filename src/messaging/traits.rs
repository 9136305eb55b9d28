//! # Job Queue Trait
//!
//! Provider-agnostic contract for the durable, at-least-once job transport.
//!
//! A received job stays invisible to other consumers for the visibility
//! timeout. If it is neither acknowledged nor dead-lettered before the timeout
//! expires it becomes visible again and is re-delivered with an incremented
//! read count. That redelivery is the only retry mechanism in the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{MessagingError, MessagingResult};

/// Provider-assigned message identifier
pub type MessageId = i64;

/// Longest queue name pgmq accepts (table names carry a prefix)
pub const MAX_QUEUE_NAME_LENGTH: usize = 47;

/// A job handed to a consumer by [`JobQueue::receive`]
#[derive(Debug, Clone)]
pub struct ReceivedJob {
    pub queue_name: String,
    pub message_id: MessageId,
    pub payload: serde_json::Value,
    /// Number of times this message has been delivered, starting at 1
    pub read_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Create a queue if it doesn't exist (idempotent)
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()>;

    /// Bulk queue creation, called during worker bootstrap
    async fn ensure_queues(&self, queue_names: &[String]) -> MessagingResult<()> {
        for queue_name in queue_names {
            self.ensure_queue(queue_name).await?;
        }
        Ok(())
    }

    /// Hand a payload to a named queue
    async fn enqueue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
    ) -> MessagingResult<MessageId>;

    /// Receive up to `max_messages` visible jobs, hiding them for `visibility_timeout`
    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<ReceivedJob>>;

    /// Acknowledge successful processing (delete the message)
    async fn ack(&self, queue_name: &str, message_id: MessageId) -> MessagingResult<()>;

    /// Move a message out of circulation without deleting it
    async fn dead_letter(&self, queue_name: &str, message_id: MessageId) -> MessagingResult<()>;

    /// Number of messages currently stored in the queue (visible or in flight)
    async fn queue_depth(&self, queue_name: &str) -> MessagingResult<u64>;

    async fn health_check(&self) -> MessagingResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Serialize `message` and enqueue it
pub async fn enqueue_json<T>(
    queue: &dyn JobQueue,
    queue_name: &str,
    message: &T,
) -> MessagingResult<MessageId>
where
    T: Serialize + Sync + ?Sized,
{
    let payload = serde_json::to_value(message)
        .map_err(|e| MessagingError::message_serialization(e.to_string()))?;
    queue.enqueue(queue_name, &payload).await
}

/// Reject names pgmq cannot turn into table names
pub fn validate_queue_name(queue_name: &str) -> MessagingResult<()> {
    if queue_name.is_empty() {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "queue name cannot be empty",
        ));
    }

    if queue_name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            format!("queue name exceeds {MAX_QUEUE_NAME_LENGTH} characters"),
        ));
    }

    if !queue_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "only lowercase letters, digits and underscores are allowed",
        ));
    }

    Ok(())
}
