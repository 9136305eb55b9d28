//! # In-Memory Job Queue
//!
//! Thread-safe in-memory queue implementation for testing and development.
//!
//! ## Features
//!
//! - **Visibility Timeout**: Messages become invisible after receive, re-visible after timeout
//! - **Thread-Safe**: Uses `tokio::sync::RwLock` for concurrent access
//! - **Dead Letters**: Dead-lettered payloads are retained per queue for inspection

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::errors::{MessagingError, MessagingResult};
use super::traits::{validate_queue_name, JobQueue, MessageId, ReceivedJob};

/// In-memory message with visibility tracking
#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: MessageId,
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again (None = visible now)
    visible_at: Option<DateTime<Utc>>,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    /// Messages in the queue (FIFO order)
    messages: VecDeque<InMemoryQueuedMessage>,
    dead_letters: Vec<serde_json::Value>,
    total_sent: u64,
    total_acked: u64,
}

/// In-memory job queue for testing
///
/// # Example
///
/// ```rust
/// use booking_notifier::messaging::{InMemoryJobQueue, JobQueue};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let queue = InMemoryJobQueue::new();
/// queue.ensure_queue("appointment_booked").await.unwrap();
///
/// queue
///     .enqueue("appointment_booked", &serde_json::json!({"event_id": "apt-1"}))
///     .await
///     .unwrap();
///
/// let jobs = queue
///     .receive("appointment_booked", 10, Duration::from_secs(30))
///     .await
///     .unwrap();
/// assert_eq!(jobs.len(), 1);
/// assert_eq!(jobs[0].read_count, 1);
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryJobQueue {
    queues: RwLock<HashMap<String, InMemoryQueue>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }

    /// Payloads of every message in the queue, visible or in flight (for testing)
    pub async fn pending_payloads(&self, queue_name: &str) -> Vec<serde_json::Value> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Payloads that were dead-lettered from the queue (for testing)
    pub async fn dead_lettered(&self, queue_name: &str) -> Vec<serde_json::Value> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Total number of messages ever enqueued on the queue (for testing)
    pub async fn total_enqueued(&self, queue_name: &str) -> u64 {
        let queues = self.queues.read().await;
        queues.get(queue_name).map(|q| q.total_sent).unwrap_or(0)
    }

    /// Total number of messages acknowledged on the queue (for testing)
    pub async fn total_acked(&self, queue_name: &str) -> u64 {
        let queues = self.queues.read().await;
        queues.get(queue_name).map(|q| q.total_acked).unwrap_or(0)
    }

    /// Make every in-flight message visible again, as if its visibility timeout expired
    pub async fn expire_visibility(&self, queue_name: &str) {
        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get_mut(queue_name) {
            for msg in queue.messages.iter_mut() {
                msg.visible_at = None;
            }
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        validate_queue_name(queue_name)?;
        let mut queues = self.queues.write().await;
        queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn enqueue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
    ) -> MessagingResult<MessageId> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        queue.total_sent += 1;
        queue.messages.push_back(InMemoryQueuedMessage {
            id,
            payload: payload.clone(),
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });

        Ok(id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<ReceivedJob>> {
        let timeout = chrono::Duration::from_std(visibility_timeout).map_err(|e| {
            MessagingError::configuration("visibility_timeout", e.to_string())
        })?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let visible_until = now + timeout;
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }

            let is_visible = msg.visible_at.map(|vt| vt <= now).unwrap_or(true);
            if is_visible {
                msg.visible_at = Some(visible_until);
                msg.receive_count += 1;

                received.push(ReceivedJob {
                    queue_name: queue_name.to_string(),
                    message_id: msg.id,
                    payload: msg.payload.clone(),
                    read_count: msg.receive_count,
                    enqueued_at: msg.enqueued_at,
                });
            }
        }

        Ok(received)
    }

    async fn ack(&self, queue_name: &str, message_id: MessageId) -> MessagingResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        if let Some(pos) = queue.messages.iter().position(|m| m.id == message_id) {
            queue.messages.remove(pos);
            queue.total_acked += 1;
            Ok(())
        } else {
            Err(MessagingError::message_not_found(queue_name, message_id))
        }
    }

    async fn dead_letter(&self, queue_name: &str, message_id: MessageId) -> MessagingResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        match queue.messages.iter().position(|m| m.id == message_id) {
            Some(pos) => {
                if let Some(msg) = queue.messages.remove(pos) {
                    queue.dead_letters.push(msg.payload);
                }
                Ok(())
            }
            None => Err(MessagingError::message_not_found(queue_name, message_id)),
        }
    }

    async fn queue_depth(&self, queue_name: &str) -> MessagingResult<u64> {
        let queues = self.queues.read().await;
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        Ok(queue.messages.len() as u64)
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
