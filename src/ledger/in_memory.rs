//! # In-Memory Delivery Ledger
//!
//! Process-local ledger for tests and single-process development. Each key's
//! entry lives in a `DashMap` shard, and `try_claim` checks and writes the
//! status while holding that shard's write guard, which gives the same
//! compare-and-swap semantics as the conditional `UPDATE` in Postgres.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{truncate_error, DeliveryLedger, DeliveryLedgerEntry, LedgerKey};
use crate::error::{NotifierError, NotifierResult};
use crate::state_machine::DeliveryStatus;

#[derive(Debug, Default)]
pub struct InMemoryDeliveryLedger {
    entries: DashMap<LedgerKey, DeliveryLedgerEntry>,
    unavailable: AtomicBool,
}

impl InMemoryDeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StorageUnavailable` (for testing)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_available(&self, operation: &str) -> NotifierResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotifierError::storage(operation, "ledger store unavailable"));
        }
        Ok(())
    }

    fn transition(
        &self,
        entry: &DeliveryLedgerEntry,
        operation: &str,
        update: impl FnOnce(&mut DeliveryLedgerEntry),
    ) -> NotifierResult<()> {
        self.check_available(operation)?;
        match self.entries.get_mut(&entry.key()) {
            Some(mut stored) => {
                update(&mut stored);
                stored.updated_at = Utc::now();
                Ok(())
            }
            None => Err(NotifierError::storage(
                operation,
                format!("ledger entry {} does not exist", entry.id),
            )),
        }
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryDeliveryLedger {
    async fn get_or_create(&self, key: &LedgerKey) -> NotifierResult<DeliveryLedgerEntry> {
        self.check_available("get_or_create")?;
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| DeliveryLedgerEntry::pending(key));
        Ok(entry.clone())
    }

    async fn try_claim(&self, entry: &DeliveryLedgerEntry) -> NotifierResult<bool> {
        self.check_available("try_claim")?;
        let Some(mut stored) = self.entries.get_mut(&entry.key()) else {
            return Ok(false);
        };

        if !stored.status.is_claimable() {
            return Ok(false);
        }

        stored.status = DeliveryStatus::Sending;
        stored.attempts += 1;
        stored.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_sent(&self, entry: &DeliveryLedgerEntry) -> NotifierResult<()> {
        self.transition(entry, "mark_sent", |stored| {
            stored.status = DeliveryStatus::Sent;
            stored.last_error = None;
        })
    }

    async fn mark_failed(&self, entry: &DeliveryLedgerEntry, error: &str) -> NotifierResult<()> {
        let error = truncate_error(error);
        self.transition(entry, "mark_failed", move |stored| {
            stored.status = DeliveryStatus::Failed;
            stored.last_error = Some(error);
        })
    }

    async fn find(&self, key: &LedgerKey) -> NotifierResult<Option<DeliveryLedgerEntry>> {
        self.check_available("find")?;
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn stale_claims(
        &self,
        older_than: Duration,
    ) -> NotifierResult<Vec<DeliveryLedgerEntry>> {
        self.check_available("stale_claims")?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| NotifierError::configuration(e.to_string()))?;

        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.status.is_active() && entry.updated_at < cutoff)
            .map(|entry| entry.clone())
            .collect())
    }
}
