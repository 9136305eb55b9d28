//! # Appointment Store
//!
//! The single write the pipeline makes to booking data: flagging that the
//! customer's confirmation email went out. The flag update is idempotent, so
//! a redelivered mark-confirmed job is harmless.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::error::{NotifierError, NotifierResult};

#[async_trait]
pub trait AppointmentStore: Send + Sync + 'static {
    /// Set `email_sent` on the appointment; a missing row is `AppointmentNotFound`
    async fn mark_email_sent(&self, event_id: &str) -> NotifierResult<()>;
}

#[derive(Debug, Clone)]
pub struct PgAppointmentStore {
    pool: PgPool,
}

impl PgAppointmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    #[instrument(skip(self))]
    async fn mark_email_sent(&self, event_id: &str) -> NotifierResult<()> {
        let result = sqlx::query(
            "UPDATE appointments SET email_sent = TRUE, updated_at = NOW() \
             WHERE appointment_id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifierError::storage("mark_email_sent", e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(NotifierError::AppointmentNotFound {
                event_id: event_id.to_string(),
            });
        }

        debug!("Appointment confirmation flagged");
        Ok(())
    }
}
