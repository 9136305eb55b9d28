//! # PostgreSQL Delivery Ledger
//!
//! The production ledger. Uniqueness of (event_id, recipient, event_kind) is a
//! table constraint, and the claim is a single conditional `UPDATE` whose
//! affected-row count decides the winner. No explicit transactions or row
//! locks are taken.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{truncate_error, DeliveryLedger, DeliveryLedgerEntry, LedgerKey};
use crate::error::{NotifierError, NotifierResult};

/// Raw row; enum columns are stored as text and checked by the schema
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    event_id: String,
    recipient: String,
    event_kind: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for DeliveryLedgerEntry {
    type Error = NotifierError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| NotifierError::storage("decode_ledger_row", message);
        Ok(Self {
            id: row.id,
            event_id: row.event_id,
            recipient: row.recipient.parse().map_err(corrupt)?,
            event_kind: row.event_kind.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, event_id, recipient, event_kind, status, attempts, \
                              last_error, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgDeliveryLedger {
    pool: PgPool,
}

impl PgDeliveryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select_by_key(&self, key: &LedgerKey) -> NotifierResult<Option<DeliveryLedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM delivery_ledger \
             WHERE event_id = $1 AND recipient = $2 AND event_kind = $3"
        ))
        .bind(&key.event_id)
        .bind(key.recipient.to_string())
        .bind(key.event_kind.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("find", e.to_string()))?;

        row.map(DeliveryLedgerEntry::try_from).transpose()
    }
}

#[async_trait]
impl DeliveryLedger for PgDeliveryLedger {
    #[instrument(skip(self), fields(key = %key))]
    async fn get_or_create(&self, key: &LedgerKey) -> NotifierResult<DeliveryLedgerEntry> {
        let inserted = sqlx::query_as::<_, LedgerRow>(&format!(
            "INSERT INTO delivery_ledger (id, event_id, recipient, event_kind, status, attempts) \
             VALUES ($1, $2, $3, $4, 'pending', 0) \
             ON CONFLICT (event_id, recipient, event_kind) DO NOTHING \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&key.event_id)
        .bind(key.recipient.to_string())
        .bind(key.event_kind.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("get_or_create", e.to_string()))?;

        if let Some(row) = inserted {
            debug!("Created delivery ledger entry");
            return row.try_into();
        }

        // Lost the insert race; the winner's row is visible to a new statement.
        self.select_by_key(key).await?.ok_or_else(|| {
            NotifierError::storage(
                "get_or_create",
                format!("ledger entry for {key} conflicted but could not be read back"),
            )
        })
    }

    #[instrument(skip(self, entry), fields(entry_id = %entry.id))]
    async fn try_claim(&self, entry: &DeliveryLedgerEntry) -> NotifierResult<bool> {
        let result = sqlx::query(
            "UPDATE delivery_ledger \
             SET status = 'sending', attempts = attempts + 1, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'failed')",
        )
        .bind(entry.id)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("try_claim", e.to_string()))?;

        let claimed = result.rows_affected() == 1;
        debug!(claimed, "Claim attempt finished");
        Ok(claimed)
    }

    #[instrument(skip(self, entry), fields(entry_id = %entry.id))]
    async fn mark_sent(&self, entry: &DeliveryLedgerEntry) -> NotifierResult<()> {
        sqlx::query(
            "UPDATE delivery_ledger \
             SET status = 'sent', last_error = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(entry.id)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("mark_sent", e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, entry, error), fields(entry_id = %entry.id))]
    async fn mark_failed(&self, entry: &DeliveryLedgerEntry, error: &str) -> NotifierResult<()> {
        sqlx::query(
            "UPDATE delivery_ledger \
             SET status = 'failed', last_error = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(entry.id)
        .bind(truncate_error(error))
        .execute(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("mark_failed", e.to_string()))?;
        Ok(())
    }

    async fn find(&self, key: &LedgerKey) -> NotifierResult<Option<DeliveryLedgerEntry>> {
        self.select_by_key(key).await
    }

    async fn stale_claims(
        &self,
        older_than: Duration,
    ) -> NotifierResult<Vec<DeliveryLedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM delivery_ledger \
             WHERE status = 'sending' \
               AND updated_at < NOW() - make_interval(secs => $1) \
             ORDER BY updated_at ASC"
        ))
        .bind(older_than.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("stale_claims", e.to_string()))?;

        if !rows.is_empty() {
            warn!(count = rows.len(), "Delivery ledger has stale sending entries");
        }

        rows.into_iter().map(DeliveryLedgerEntry::try_from).collect()
    }
}
