//! # Notification Executor
//!
//! Runs the ledger claim protocol for one (event, recipient) unit:
//!
//! 1. `get_or_create` the ledger entry
//! 2. already `sent` -> [`DeliveryOutcome::AlreadySent`]
//! 3. `try_claim`; lost -> [`DeliveryOutcome::ClaimLost`]
//! 4. compose and send
//! 5. success -> `mark_sent`; failure -> `mark_failed` and return the error
//!
//! The transport is only reached after a successful claim, so however many
//! times a job is redelivered or executed concurrently, each unit is sent at
//! most once. A storage error before the claim means nothing is sent.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::NotifierResult;
use crate::events::{LifecycleEvent, Recipient};
use crate::ledger::{DeliveryLedger, LedgerKey};
use crate::logging::log_delivery_operation;
use crate::mail::{EmailTransport, MessageComposer};
use crate::state_machine::DeliveryStatus;

/// Result of one unit that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// This execution sent the email
    Sent,
    /// A previous execution already sent it
    AlreadySent,
    /// Another execution holds the claim
    ClaimLost,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

pub struct NotificationExecutor {
    ledger: Arc<dyn DeliveryLedger>,
    transport: Arc<dyn EmailTransport>,
    composer: Arc<MessageComposer>,
}

impl std::fmt::Debug for NotificationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationExecutor")
            .field("transport", &self.transport.transport_name())
            .finish()
    }
}

impl NotificationExecutor {
    pub fn new(
        ledger: Arc<dyn DeliveryLedger>,
        transport: Arc<dyn EmailTransport>,
        composer: Arc<MessageComposer>,
    ) -> Self {
        Self {
            ledger,
            transport,
            composer,
        }
    }

    #[instrument(
        skip(self, event),
        fields(event_id = %event.event_id(), recipient = %recipient, event_kind = %event.kind())
    )]
    pub async fn process(
        &self,
        event: &LifecycleEvent,
        recipient: Recipient,
    ) -> NotifierResult<DeliveryOutcome> {
        let key = LedgerKey::for_event(event, recipient);
        let entry = self.ledger.get_or_create(&key).await?;

        if entry.status == DeliveryStatus::Sent {
            debug!("Notification already sent, skipping");
            return Ok(DeliveryOutcome::AlreadySent);
        }

        if !self.ledger.try_claim(&entry).await? {
            debug!(status = %entry.status, "Claim lost to another execution");
            return Ok(DeliveryOutcome::ClaimLost);
        }

        let sent = match self.composer.compose(event, recipient) {
            Ok(message) => self.transport.send(&message).await,
            Err(err) => Err(err),
        };

        match sent {
            Ok(()) => {
                self.ledger.mark_sent(&entry).await?;
                log_delivery_operation(
                    "send",
                    &key.event_id,
                    recipient,
                    key.event_kind,
                    DeliveryStatus::Sent.as_str(),
                    None,
                );
                Ok(DeliveryOutcome::Sent)
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(mark_err) = self.ledger.mark_failed(&entry, &message).await {
                    // The entry stays `sending` and will not be reclaimed
                    warn!(error = %mark_err, "Failed to record delivery failure");
                }
                log_delivery_operation(
                    "send",
                    &key.event_id,
                    recipient,
                    key.event_kind,
                    DeliveryStatus::Failed.as_str(),
                    Some(&message),
                );
                Err(err)
            }
        }
    }

    /// Notify every recipient the event has
    pub async fn notify_all(
        &self,
        event: &LifecycleEvent,
    ) -> NotifierResult<Vec<(Recipient, DeliveryOutcome)>> {
        self.notify(event, event.recipients()).await
    }

    /// Process `recipients` concurrently
    ///
    /// Every recipient is attempted; if any failed, the first error (in
    /// recipient order) is returned after all have finished.
    pub async fn notify(
        &self,
        event: &LifecycleEvent,
        recipients: &[Recipient],
    ) -> NotifierResult<Vec<(Recipient, DeliveryOutcome)>> {
        let results = join_all(
            recipients
                .iter()
                .map(|&recipient| async move { (recipient, self.process(event, recipient).await) }),
        )
        .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (recipient, result) in results {
            match result {
                Ok(outcome) => outcomes.push((recipient, outcome)),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }
}
