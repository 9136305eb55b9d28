//! # Notification Publisher
//!
//! The enqueue API the booking service calls after persisting a change.
//! Publishing is at-least-once: a caller that retries a failed publish may
//! enqueue the same event twice, which the delivery ledger absorbs.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use super::types::{BookedAppointment, LifecycleEvent};
use crate::config::QueuesConfig;
use crate::error::NotifierResult;
use crate::messaging::{enqueue_json, JobQueue, MessageId};
use crate::registry::QueueRegistry;

/// What the caller gets back: where the job went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub queue: String,
    pub message_id: MessageId,
    pub event_id: String,
}

pub struct NotificationPublisher {
    queue: Arc<dyn JobQueue>,
    registry: Arc<QueueRegistry>,
    queues: QueuesConfig,
}

impl std::fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher")
            .field("provider", &self.queue.provider_name())
            .finish()
    }
}

impl NotificationPublisher {
    pub fn new(queue: Arc<dyn JobQueue>, registry: Arc<QueueRegistry>, queues: QueuesConfig) -> Self {
        Self {
            queue,
            registry,
            queues,
        }
    }

    /// Enqueue `event` on a registered queue
    #[instrument(skip(self, event), fields(event_id = %event.event_id(), kind = %event.kind()))]
    pub async fn enqueue(
        &self,
        queue_name: &str,
        event: &LifecycleEvent,
    ) -> NotifierResult<PublishReceipt> {
        self.registry.lookup(queue_name)?;
        let event = event.clone().with_identity();
        let message_id = enqueue_json(self.queue.as_ref(), queue_name, &event).await?;
        debug!(queue = %queue_name, message_id, "Published lifecycle event");

        Ok(PublishReceipt {
            queue: queue_name.to_string(),
            message_id,
            event_id: event.event_id(),
        })
    }

    /// Route an event to the queue for its kind
    pub async fn publish(&self, event: &LifecycleEvent) -> NotifierResult<PublishReceipt> {
        let queue_name = match event {
            LifecycleEvent::Booked(_) => &self.queues.appointment_booked,
            LifecycleEvent::Cancelled(_) => &self.queues.appointment_cancelled,
            LifecycleEvent::Inquiry(_) => &self.queues.service_inquiry,
        };
        self.enqueue(queue_name, event).await
    }

    /// Start the confirm-user-then-admin chain for a booking
    pub async fn publish_booking_chain(
        &self,
        booked: &BookedAppointment,
    ) -> NotifierResult<PublishReceipt> {
        let event = LifecycleEvent::Booked(booked.clone());
        self.enqueue(&self.queues.user_confirmation_email, &event).await
    }
}
