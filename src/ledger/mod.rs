//! # Delivery Ledger
//!
//! Durable record of every (event, recipient, kind) notification unit and its
//! send status. The ledger is the only concurrency-control primitive in the
//! pipeline: redelivered or concurrently executed jobs are reduced to at most
//! one send by [`DeliveryLedger::try_claim`], a single conditional write.
//!
//! ## Contract
//!
//! - `get_or_create` is an idempotent upsert; concurrent first touches race to
//!   a single row and every caller observes the winner's row.
//! - `try_claim` moves `pending | failed` to `sending` only if the stored
//!   status is still claimable at the moment of the write.
//! - `mark_sent` / `mark_failed` are unconditional; only the claim holder calls them.
//! - Storage failures surface as [`NotifierError::StorageUnavailable`]; callers
//!   must treat that as unknown state and not send.
//!
//! [`NotifierError::StorageUnavailable`]: crate::error::NotifierError::StorageUnavailable

pub mod in_memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotifierResult;
use crate::events::{EventKind, LifecycleEvent, Recipient};
use crate::state_machine::DeliveryStatus;

pub use in_memory::InMemoryDeliveryLedger;
pub use postgres::PgDeliveryLedger;

/// Unique identity of one notification unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub event_id: String,
    pub recipient: Recipient,
    pub event_kind: EventKind,
}

impl LedgerKey {
    pub fn new(event_id: impl Into<String>, recipient: Recipient, event_kind: EventKind) -> Self {
        Self {
            event_id: event_id.into(),
            recipient,
            event_kind,
        }
    }

    pub fn for_event(event: &LifecycleEvent, recipient: Recipient) -> Self {
        Self::new(event.event_id(), recipient, event.kind())
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.event_id, self.recipient, self.event_kind)
    }
}

/// One row of the delivery ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLedgerEntry {
    pub id: Uuid,
    pub event_id: String,
    pub recipient: Recipient,
    pub event_kind: EventKind,
    pub status: DeliveryStatus,
    /// Number of successful claims, i.e. send attempts started
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryLedgerEntry {
    /// Fresh `pending` entry for a key
    pub fn pending(key: &LedgerKey) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id: key.event_id.clone(),
            recipient: key.recipient,
            event_kind: key.event_kind,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.event_id.clone(), self.recipient, self.event_kind)
    }
}

/// Longest error message kept in `last_error`
pub const MAX_ERROR_LENGTH: usize = 2000;

pub(crate) fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LENGTH {
        return error.to_string();
    }
    let mut end = MAX_ERROR_LENGTH;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}

#[async_trait]
pub trait DeliveryLedger: Send + Sync + 'static {
    /// Find the entry for `key`, creating it as `pending` on first touch
    async fn get_or_create(&self, key: &LedgerKey) -> NotifierResult<DeliveryLedgerEntry>;

    /// Atomically move the entry to `sending` if it is still `pending` or `failed`
    async fn try_claim(&self, entry: &DeliveryLedgerEntry) -> NotifierResult<bool>;

    async fn mark_sent(&self, entry: &DeliveryLedgerEntry) -> NotifierResult<()>;

    async fn mark_failed(&self, entry: &DeliveryLedgerEntry, error: &str) -> NotifierResult<()>;

    /// Read-only lookup
    async fn find(&self, key: &LedgerKey) -> NotifierResult<Option<DeliveryLedgerEntry>>;

    /// Entries left in `sending` for longer than `older_than`
    ///
    /// A worker that crashes mid-send leaves its entry here. The ledger never
    /// reclaims these on its own; they are reported for an operator to inspect.
    async fn stale_claims(&self, older_than: Duration)
        -> NotifierResult<Vec<DeliveryLedgerEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_entry_matches_key() {
        let key = LedgerKey::new("apt-1", Recipient::User, EventKind::Booked);
        let entry = DeliveryLedgerEntry::pending(&key);
        assert_eq!(entry.status, DeliveryStatus::Pending);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.key(), key);
        assert_eq!(key.to_string(), "apt-1/user/booked");
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        let long = "ä".repeat(MAX_ERROR_LENGTH);
        let truncated = truncate_error(&long);
        assert!(truncated.len() <= MAX_ERROR_LENGTH);
        assert!(truncated.chars().all(|c| c == 'ä'));
        assert_eq!(truncate_error("short"), "short");
    }
}
