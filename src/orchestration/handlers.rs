//! Job handlers bound to the pipeline queues.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::appointments::AppointmentStore;
use crate::error::{NotifierError, NotifierResult};
use crate::events::{EventKind, LifecycleEvent, Recipient};
use crate::executor::{DeliveryOutcome, NotificationExecutor};
use crate::ledger::LedgerKey;
use crate::messaging::ReceivedJob;
use crate::registry::JobHandler;

fn parse_event(job: &ReceivedJob, expected: Option<EventKind>) -> NotifierResult<LifecycleEvent> {
    let event: LifecycleEvent = serde_json::from_value(job.payload.clone()).map_err(|e| {
        NotifierError::InvalidPayload(format!("job {} on {}: {e}", job.message_id, job.queue_name))
    })?;

    if let Some(expected) = expected {
        if event.kind() != expected {
            return Err(NotifierError::InvalidPayload(format!(
                "queue {} only accepts {expected} events, got {}",
                job.queue_name,
                event.kind()
            )));
        }
    }
    Ok(event)
}

/// Runs the executor for an event's recipients
pub struct NotifyHandler {
    name: String,
    executor: Arc<NotificationExecutor>,
    /// `None` notifies everyone the event names
    recipients: Option<Vec<Recipient>>,
    expected_kind: Option<EventKind>,
}

impl NotifyHandler {
    /// Notify every recipient of whatever event arrives
    pub fn all_recipients(name: impl Into<String>, executor: Arc<NotificationExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
            recipients: None,
            expected_kind: None,
        }
    }

    /// Notify only `recipients`, and only for events of `kind`
    pub fn only(
        name: impl Into<String>,
        executor: Arc<NotificationExecutor>,
        kind: EventKind,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            name: name.into(),
            executor,
            recipients: Some(recipients),
            expected_kind: Some(kind),
        }
    }
}

#[async_trait]
impl JobHandler for NotifyHandler {
    async fn handle(&self, job: &ReceivedJob) -> NotifierResult<Value> {
        let event = parse_event(job, self.expected_kind)?;
        let outcomes = match &self.recipients {
            Some(recipients) => self.executor.notify(&event, recipients).await?,
            None => self.executor.notify_all(&event).await?,
        };

        // Acking now would signal completion before that send is known to succeed
        if let Some((recipient, _)) = outcomes
            .iter()
            .find(|(_, outcome)| *outcome == DeliveryOutcome::ClaimLost)
        {
            return Err(NotifierError::DeliveryInFlight {
                key: LedgerKey::for_event(&event, *recipient).to_string(),
            });
        }

        let outcomes: Vec<Value> = outcomes
            .into_iter()
            .map(|(recipient, outcome)| json!({ "recipient": recipient, "outcome": outcome }))
            .collect();
        Ok(json!({ "event_id": event.event_id(), "outcomes": outcomes }))
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Flags the appointment once the customer's confirmation went out
pub struct ConfirmEmailHandler {
    store: Arc<dyn AppointmentStore>,
}

impl ConfirmEmailHandler {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobHandler for ConfirmEmailHandler {
    async fn handle(&self, job: &ReceivedJob) -> NotifierResult<Value> {
        let event = parse_event(job, Some(EventKind::Booked))?;
        let event_id = event.event_id();
        self.store.mark_email_sent(&event_id).await?;
        debug!(event_id = %event_id, "Marked confirmation email as sent");
        Ok(json!({ "event_id": event_id, "email_sent": true }))
    }

    fn handler_name(&self) -> &str {
        "confirm_user_email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DeliveryLedger, InMemoryDeliveryLedger};
    use crate::mail::{BuiltinTemplateRenderer, MessageComposer};
    use crate::test_utils::{booked_event, cancelled_event, test_config, RecordingTransport};
    use chrono::Utc;

    fn job(event: &LifecycleEvent) -> ReceivedJob {
        ReceivedJob {
            queue_name: "user_confirmation_email".to_string(),
            message_id: 1,
            payload: serde_json::to_value(event).unwrap(),
            read_count: 1,
            enqueued_at: Utc::now(),
        }
    }

    fn handler(ledger: Arc<InMemoryDeliveryLedger>) -> NotifyHandler {
        let composer =
            MessageComposer::new(test_config().mail, Arc::new(BuiltinTemplateRenderer::new()))
                .unwrap();
        let executor = NotificationExecutor::new(
            ledger,
            Arc::new(RecordingTransport::new()),
            Arc::new(composer),
        );
        NotifyHandler::only(
            "user_confirmation_email",
            Arc::new(executor),
            EventKind::Booked,
            vec![Recipient::User],
        )
    }

    #[tokio::test]
    async fn test_claim_held_elsewhere_is_retryable() {
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let event = booked_event("apt-1");
        let entry = ledger
            .get_or_create(&LedgerKey::for_event(&event, Recipient::User))
            .await
            .unwrap();
        assert!(ledger.try_claim(&entry).await.unwrap());

        let err = handler(ledger).handle(&job(&event)).await.unwrap_err();
        assert!(matches!(err, NotifierError::DeliveryInFlight { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_event_kind_is_rejected() {
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let err = handler(ledger.clone())
            .handle(&job(&cancelled_event("apt-2")))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifierError::InvalidPayload(_)));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_result_reports_outcomes() {
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let result = handler(ledger).handle(&job(&booked_event("apt-3"))).await.unwrap();
        assert_eq!(result["event_id"], "apt-3");
        assert_eq!(result["outcomes"][0]["recipient"], "user");
        assert_eq!(result["outcomes"][0]["outcome"], "sent");
    }
}
