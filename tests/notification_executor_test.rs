//! Executor behaviour against the in-memory ledger and a recording transport.

use std::sync::Arc;
use std::time::Duration;

use booking_notifier::error::ErrorKind;
use booking_notifier::events::{EventKind, Recipient};
use booking_notifier::executor::{DeliveryOutcome, NotificationExecutor};
use booking_notifier::ledger::{DeliveryLedger, InMemoryDeliveryLedger, LedgerKey};
use booking_notifier::mail::{BuiltinTemplateRenderer, MessageComposer};
use booking_notifier::state_machine::DeliveryStatus;
use booking_notifier::test_utils::{
    booked_event, cancelled_event, inquiry_event, test_config, RecordingTransport,
    TEST_ADMIN_EMAIL,
};
use futures::future::join_all;

struct Harness {
    executor: Arc<NotificationExecutor>,
    ledger: Arc<InMemoryDeliveryLedger>,
    transport: Arc<RecordingTransport>,
}

fn harness(transport: RecordingTransport) -> Harness {
    let ledger = Arc::new(InMemoryDeliveryLedger::new());
    let transport = Arc::new(transport);
    let composer = MessageComposer::new(
        test_config().mail,
        Arc::new(BuiltinTemplateRenderer::new()),
    )
    .unwrap();
    let executor = Arc::new(NotificationExecutor::new(
        ledger.clone(),
        transport.clone(),
        Arc::new(composer),
    ));
    Harness {
        executor,
        ledger,
        transport,
    }
}

#[tokio::test]
async fn test_first_delivery_sends_and_reprocessing_skips() {
    let h = harness(RecordingTransport::new());
    let event = booked_event("apt-1");

    let outcome = h.executor.process(&event, Recipient::User).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Sent);

    let entry = h
        .ledger
        .find(&LedgerKey::new("apt-1", Recipient::User, EventKind::Booked))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, DeliveryStatus::Sent);
    assert_eq!(entry.attempts, 1);

    let again = h.executor.process(&event, Recipient::User).await.unwrap();
    assert_eq!(again, DeliveryOutcome::AlreadySent);
    assert_eq!(h.transport.attempts(), 1);
    assert_eq!(h.transport.sent_to("aino@example.fi").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_send_once() {
    let h = harness(RecordingTransport::with_delay(Duration::from_millis(50)));
    let event = booked_event("apt-2");

    let outcomes = join_all((0..8).map(|_| {
        let executor = h.executor.clone();
        let event = event.clone();
        tokio::spawn(async move { executor.process(&event, Recipient::Admin).await })
    }))
    .await;

    let outcomes: Vec<DeliveryOutcome> = outcomes
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_sent()).count(), 1);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, DeliveryOutcome::Sent | DeliveryOutcome::ClaimLost | DeliveryOutcome::AlreadySent)));

    assert_eq!(h.transport.attempts(), 1);
    assert_eq!(h.transport.sent_to(TEST_ADMIN_EMAIL).len(), 1);
}

#[tokio::test]
async fn test_failed_send_is_retried_on_redelivery() {
    let transport = RecordingTransport::new();
    transport.fail_next(1);
    let h = harness(transport);
    let event = cancelled_event("apt-3");
    let key = LedgerKey::new("apt-3", Recipient::User, EventKind::Cancelled);

    let err = h.executor.process(&event, Recipient::User).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);

    let failed = h.ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert!(failed.last_error.unwrap().contains("simulated mail API outage"));

    let outcome = h.executor.process(&event, Recipient::User).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Sent);

    let sent = h.ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(sent.attempts, 2);
    assert_eq!(h.transport.attempts(), 2);
    assert_eq!(h.transport.sent_count(), 1);
}

#[tokio::test]
async fn test_storage_outage_sends_nothing() {
    let h = harness(RecordingTransport::new());
    h.ledger.set_unavailable(true);

    let err = h
        .executor
        .process(&booked_event("apt-4"), Recipient::User)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert!(err.is_retryable());
    assert_eq!(h.transport.attempts(), 0);
}

#[tokio::test]
async fn test_in_flight_claim_is_not_stolen() {
    let h = harness(RecordingTransport::new());
    let key = LedgerKey::new("apt-5", Recipient::User, EventKind::Booked);
    let entry = h.ledger.get_or_create(&key).await.unwrap();
    assert!(h.ledger.try_claim(&entry).await.unwrap());

    let outcome = h
        .executor
        .process(&booked_event("apt-5"), Recipient::User)
        .await
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::ClaimLost);
    assert_eq!(h.transport.attempts(), 0);
}

#[tokio::test]
async fn test_notify_all_covers_every_recipient() {
    let h = harness(RecordingTransport::new());

    let outcomes = h.executor.notify_all(&booked_event("apt-6")).await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            (Recipient::User, DeliveryOutcome::Sent),
            (Recipient::Admin, DeliveryOutcome::Sent)
        ]
    );
    assert_eq!(h.transport.sent_to("aino@example.fi").len(), 1);
    assert_eq!(h.transport.sent_to(TEST_ADMIN_EMAIL).len(), 1);

    let inquiry = h.executor.notify_all(&inquiry_event()).await.unwrap();
    assert_eq!(inquiry, vec![(Recipient::Admin, DeliveryOutcome::Sent)]);
    assert_eq!(h.transport.sent_count(), 3);
}

#[tokio::test]
async fn test_notify_attempts_everyone_before_reporting_failure() {
    let transport = RecordingTransport::new();
    transport.fail_next(1);
    let h = harness(transport);
    let event = booked_event("apt-7");

    assert!(h.executor.notify_all(&event).await.is_err());
    assert_eq!(h.transport.attempts(), 2);
    assert_eq!(h.transport.sent_count(), 1);

    // The redelivered job only re-sends the unit that failed
    let outcomes = h.executor.notify_all(&event).await.unwrap();
    let sent: Vec<_> = outcomes.iter().filter(|(_, o)| o.is_sent()).collect();
    let skipped: Vec<_> = outcomes
        .iter()
        .filter(|(_, o)| *o == DeliveryOutcome::AlreadySent)
        .collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(skipped.len(), 1);
    assert_eq!(h.transport.sent_count(), 2);
}

#[tokio::test]
async fn test_missing_template_fails_without_sending() {
    let h = harness(RecordingTransport::new());

    let err = h
        .executor
        .process(&inquiry_event(), Recipient::User)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(h.transport.attempts(), 0);
}
