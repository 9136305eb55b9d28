//! # Error Types
//!
//! Tagged error taxonomy for the notification pipeline. Every failure that can
//! reach a worker is one of these variants, and [`ErrorKind`] lets callers
//! decide retry behaviour with an exhaustive `match` instead of inspecting
//! error strings.

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifierError {
    /// The ledger (or another durable store) could not complete a read or write.
    /// Prior delivery state is unknown, so nothing may be sent.
    #[error("Storage unavailable during {operation}: {message}")]
    StorageUnavailable { operation: String, message: String },

    #[error("Failed to render template {template}: {message}")]
    RenderFailed { template: String, message: String },

    #[error("Email transport failed: {0}")]
    TransportFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Appointment not found: {event_id}")]
    AppointmentNotFound { event_id: String },

    /// Another execution holds the claim for this unit and has not finished
    #[error("Delivery in flight elsewhere: {key}")]
    DeliveryInFlight { key: String },
}

/// Coarse classification of [`NotifierError`] used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StorageUnavailable,
    RenderFailure,
    TransportFailure,
    Configuration,
    Messaging,
    InvalidPayload,
    NotFound,
    InFlight,
}

impl NotifierError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn render(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RenderFailed {
            template: template.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailed(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            Self::RenderFailed { .. } => ErrorKind::RenderFailure,
            Self::TransportFailed(_) => ErrorKind::TransportFailure,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Messaging(_) => ErrorKind::Messaging,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::AppointmentNotFound { .. } => ErrorKind::NotFound,
            Self::DeliveryInFlight { .. } => ErrorKind::InFlight,
        }
    }

    /// Whether the job transport should re-deliver the job that produced this error.
    ///
    /// Configuration errors are startup-ordering bugs and a payload that does not
    /// deserialize will never deserialize; everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::StorageUnavailable
            | ErrorKind::RenderFailure
            | ErrorKind::TransportFailure
            | ErrorKind::Messaging
            | ErrorKind::NotFound
            | ErrorKind::InFlight => true,
            ErrorKind::Configuration | ErrorKind::InvalidPayload => false,
        }
    }
}

impl From<sqlx::Error> for NotifierError {
    fn from(err: sqlx::Error) -> Self {
        NotifierError::storage("database", err.to_string())
    }
}

impl From<serde_json::Error> for NotifierError {
    fn from(err: serde_json::Error) -> Self {
        NotifierError::InvalidPayload(err.to_string())
    }
}

impl From<reqwest::Error> for NotifierError {
    fn from(err: reqwest::Error) -> Self {
        NotifierError::transport(err.to_string())
    }
}

impl From<MessagingError> for NotifierError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::Configuration { .. } | MessagingError::InvalidQueueName { .. } => {
                NotifierError::Configuration(err.to_string())
            }
            _ => NotifierError::Messaging(err.to_string()),
        }
    }
}

impl From<ConfigurationError> for NotifierError {
    fn from(err: ConfigurationError) -> Self {
        NotifierError::Configuration(err.to_string())
    }
}

pub type NotifierResult<T> = std::result::Result<T, NotifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(NotifierError::storage("get_or_create", "connection refused").is_retryable());
        assert!(NotifierError::render("user_booking_confirmation", "missing date").is_retryable());
        assert!(NotifierError::transport("502 Bad Gateway").is_retryable());
        assert!(NotifierError::Messaging("read failed".to_string()).is_retryable());
        assert!(NotifierError::AppointmentNotFound {
            event_id: "apt-1".to_string()
        }
        .is_retryable());
        assert!(NotifierError::DeliveryInFlight {
            key: "apt-1/user/booked".to_string()
        }
        .is_retryable());

        assert!(!NotifierError::configuration("queue not registered").is_retryable());
        assert!(!NotifierError::InvalidPayload("missing field".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = NotifierError::storage("try_claim", "pool timed out");
        let display = err.to_string();
        assert!(display.contains("Storage unavailable"));
        assert!(display.contains("try_claim"));
        assert!(display.contains("pool timed out"));
    }

    #[test]
    fn test_conversions() {
        let err: NotifierError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: NotifierError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);

        let err: NotifierError = MessagingError::queue_not_found("nowhere").into();
        assert_eq!(err.kind(), ErrorKind::Messaging);

        let err: NotifierError = MessagingError::configuration("queues", "empty name").into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
