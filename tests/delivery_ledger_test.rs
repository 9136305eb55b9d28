//! Delivery ledger contract tests.
//!
//! The same claim semantics are checked against the in-memory ledger and,
//! when `DATABASE_URL` points at a PostgreSQL instance, the real table.

mod common;

use std::sync::Arc;
use std::time::Duration;

use booking_notifier::events::{EventKind, Recipient};
use booking_notifier::ledger::{
    DeliveryLedger, InMemoryDeliveryLedger, LedgerKey, PgDeliveryLedger, MAX_ERROR_LENGTH,
};
use booking_notifier::state_machine::DeliveryStatus;
use common::{setup_test_pool, unique_name};
use futures::future::join_all;

async fn assert_claim_lifecycle(ledger: &dyn DeliveryLedger, key: LedgerKey) {
    let entry = ledger.get_or_create(&key).await.unwrap();
    assert_eq!(entry.status, DeliveryStatus::Pending);
    assert_eq!(entry.attempts, 0);

    assert!(ledger.try_claim(&entry).await.unwrap());
    assert!(!ledger.try_claim(&entry).await.unwrap(), "sending entry must not be reclaimed");

    ledger.mark_failed(&entry, "502 Bad Gateway").await.unwrap();
    let failed = ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("502 Bad Gateway"));

    assert!(ledger.try_claim(&failed).await.unwrap(), "failed entry is claimable again");
    ledger.mark_sent(&failed).await.unwrap();

    let sent = ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(sent.attempts, 2);
    assert!(sent.last_error.is_none());
    assert_eq!(sent.id, entry.id);

    assert!(!ledger.try_claim(&sent).await.unwrap(), "sent is absorbing");
}

async fn assert_single_winner(ledger: Arc<dyn DeliveryLedger>, key: LedgerKey) {
    let claims = join_all((0..16).map(|_| {
        let ledger = ledger.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let entry = ledger.get_or_create(&key).await.unwrap();
            ledger.try_claim(&entry).await.unwrap()
        })
    }))
    .await;

    let winners = claims.into_iter().filter(|claim| *claim.as_ref().unwrap()).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_in_memory_claim_lifecycle() {
    let ledger = InMemoryDeliveryLedger::new();
    assert_claim_lifecycle(&ledger, LedgerKey::new("apt-1", Recipient::User, EventKind::Booked))
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_memory_concurrent_claims_have_one_winner() {
    let ledger: Arc<dyn DeliveryLedger> = Arc::new(InMemoryDeliveryLedger::new());
    assert_single_winner(
        ledger,
        LedgerKey::new("apt-2", Recipient::Admin, EventKind::Cancelled),
    )
    .await;
}

#[tokio::test]
async fn test_in_memory_units_are_independent() {
    let ledger = InMemoryDeliveryLedger::new();
    let user = LedgerKey::new("apt-3", Recipient::User, EventKind::Booked);
    let admin = LedgerKey::new("apt-3", Recipient::Admin, EventKind::Booked);
    let cancelled = LedgerKey::new("apt-3", Recipient::User, EventKind::Cancelled);

    let entry = ledger.get_or_create(&user).await.unwrap();
    ledger.try_claim(&entry).await.unwrap();
    ledger.mark_sent(&entry).await.unwrap();

    for key in [admin, cancelled] {
        let other = ledger.get_or_create(&key).await.unwrap();
        assert_eq!(other.status, DeliveryStatus::Pending);
        assert!(ledger.try_claim(&other).await.unwrap());
    }
    assert_eq!(ledger.len(), 3);
}

#[tokio::test]
async fn test_in_memory_unavailable_store_fails_every_operation() {
    let ledger = InMemoryDeliveryLedger::new();
    let key = LedgerKey::new("apt-4", Recipient::User, EventKind::Booked);
    let entry = ledger.get_or_create(&key).await.unwrap();

    ledger.set_unavailable(true);
    assert!(ledger.get_or_create(&key).await.is_err());
    assert!(ledger.try_claim(&entry).await.is_err());
    assert!(ledger.find(&key).await.is_err());

    ledger.set_unavailable(false);
    assert_eq!(
        ledger.find(&key).await.unwrap().unwrap().status,
        DeliveryStatus::Pending
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_claim_lifecycle() {
    let pool = setup_test_pool().await;
    let ledger = PgDeliveryLedger::new(pool);
    assert_claim_lifecycle(
        &ledger,
        LedgerKey::new(unique_name("apt"), Recipient::User, EventKind::Booked),
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_concurrent_get_or_create_and_claim() {
    let pool = setup_test_pool().await;
    let ledger: Arc<dyn DeliveryLedger> = Arc::new(PgDeliveryLedger::new(pool));
    let key = LedgerKey::new(unique_name("apt"), Recipient::Admin, EventKind::Booked);

    assert_single_winner(ledger.clone(), key.clone()).await;

    let entry = ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(entry.status, DeliveryStatus::Sending);
    assert_eq!(entry.attempts, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_long_errors_are_truncated() {
    let pool = setup_test_pool().await;
    let ledger = PgDeliveryLedger::new(pool);
    let key = LedgerKey::new(unique_name("apt"), Recipient::User, EventKind::Cancelled);

    let entry = ledger.get_or_create(&key).await.unwrap();
    assert!(ledger.try_claim(&entry).await.unwrap());
    ledger
        .mark_failed(&entry, &"x".repeat(MAX_ERROR_LENGTH * 2))
        .await
        .unwrap();

    let failed = ledger.find(&key).await.unwrap().unwrap();
    assert_eq!(failed.last_error.unwrap().len(), MAX_ERROR_LENGTH);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_stale_claims_report_abandoned_sends() {
    let pool = setup_test_pool().await;
    let ledger = PgDeliveryLedger::new(pool.clone());
    let key = LedgerKey::new(unique_name("apt"), Recipient::User, EventKind::Booked);

    let entry = ledger.get_or_create(&key).await.unwrap();
    assert!(ledger.try_claim(&entry).await.unwrap());

    sqlx::query("UPDATE delivery_ledger SET updated_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(entry.id)
        .execute(&pool)
        .await
        .unwrap();

    let stale = ledger.stale_claims(Duration::from_secs(60)).await.unwrap();
    assert!(stale.iter().any(|stale| stale.id == entry.id));

    let recent = ledger.stale_claims(Duration::from_secs(7200)).await.unwrap();
    assert!(!recent.iter().any(|stale| stale.id == entry.id));
}
