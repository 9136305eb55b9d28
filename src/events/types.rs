//! # Lifecycle Event Types
//!
//! Job payloads handed to the pipeline by the booking service. Each variant
//! carries exactly the fields its notifications need; the `kind` tag selects
//! the variant on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// The customer who booked the appointment
    User,
    /// Business staff
    Admin,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Recipient {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid recipient: {s}")),
        }
    }
}

/// Kind of lifecycle event, as recorded in the delivery ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Booked,
    Cancelled,
    Inquiry,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booked => write!(f, "booked"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Inquiry => write!(f, "inquiry"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(Self::Booked),
            "cancelled" => Ok(Self::Cancelled),
            "inquiry" => Ok(Self::Inquiry),
            _ => Err(format!("Invalid event kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookedAppointment {
    /// Appointment id assigned by the booking service
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub service: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledAppointment {
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub service: String,
    pub start_time: DateTime<Utc>,
    pub reason: String,
}

/// Namespace for inquiry ids derived from content
const INQUIRY_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_3a52_9d4e_4b7a_8e21_5f0c_d94a_1b63);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInquiry {
    /// Optional on the wire; see [`ServiceInquiry::identity`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inquiry_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

impl ServiceInquiry {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            inquiry_id: Some(Uuid::new_v4()),
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            message: message.into(),
        }
    }

    /// The explicit id, or a UUID v5 over the inquiry's content
    ///
    /// Payloads that arrive without an id get the same identity on every
    /// redelivery; identical inquiries collapse into one notification.
    pub fn identity(&self) -> Uuid {
        self.inquiry_id.unwrap_or_else(|| {
            let content = [&self.name, &self.email, &self.phone, &self.message]
                .map(String::as_str)
                .join("\u{1f}");
            Uuid::new_v5(&INQUIRY_NAMESPACE, content.as_bytes())
        })
    }
}

/// A fact about an appointment (or a standalone inquiry) that requires notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Booked(BookedAppointment),
    Cancelled(CancelledAppointment),
    Inquiry(ServiceInquiry),
}

const APPOINTMENT_RECIPIENTS: &[Recipient] = &[Recipient::User, Recipient::Admin];
const INQUIRY_RECIPIENTS: &[Recipient] = &[Recipient::Admin];

impl LifecycleEvent {
    /// Stable identity of the event, shared by every redelivery of its job
    pub fn event_id(&self) -> String {
        match self {
            Self::Booked(booked) => booked.event_id.clone(),
            Self::Cancelled(cancelled) => cancelled.event_id.clone(),
            Self::Inquiry(inquiry) => inquiry.identity().to_string(),
        }
    }

    /// Write the derived inquiry id into the payload so it travels with the job
    pub fn with_identity(mut self) -> Self {
        if let Self::Inquiry(inquiry) = &mut self {
            inquiry.inquiry_id = Some(inquiry.identity());
        }
        self
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Booked(_) => EventKind::Booked,
            Self::Cancelled(_) => EventKind::Cancelled,
            Self::Inquiry(_) => EventKind::Inquiry,
        }
    }

    /// Everyone who must be notified about this event
    pub fn recipients(&self) -> &'static [Recipient] {
        match self {
            Self::Booked(_) | Self::Cancelled(_) => APPOINTMENT_RECIPIENTS,
            Self::Inquiry(_) => INQUIRY_RECIPIENTS,
        }
    }

    /// Email address of the customer behind the event
    pub fn customer_email(&self) -> &str {
        match self {
            Self::Booked(booked) => &booked.email,
            Self::Cancelled(cancelled) => &cancelled.email,
            Self::Inquiry(inquiry) => &inquiry.email,
        }
    }
}

impl From<BookedAppointment> for LifecycleEvent {
    fn from(booked: BookedAppointment) -> Self {
        Self::Booked(booked)
    }
}

impl From<CancelledAppointment> for LifecycleEvent {
    fn from(cancelled: CancelledAppointment) -> Self {
        Self::Cancelled(cancelled)
    }
}

impl From<ServiceInquiry> for LifecycleEvent {
    fn from(inquiry: ServiceInquiry) -> Self {
        Self::Inquiry(inquiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn booked() -> BookedAppointment {
        BookedAppointment {
            event_id: "apt-1".to_string(),
            name: "Aino Virtanen".to_string(),
            email: "aino@example.fi".to_string(),
            phone: "+358401234567".to_string(),
            service: "Kotisiivous".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn test_event_is_tagged_by_kind() {
        let event = LifecycleEvent::from(booked());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], json!("booked"));
        assert_eq!(value["event_id"], json!("apt-1"));
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn test_cancelled_event_requires_reason() {
        let payload = json!({
            "kind": "cancelled",
            "event_id": "apt-2",
            "name": "Aino",
            "email": "aino@example.fi",
            "phone": "+358401234567",
            "service": "Kotiapu",
            "start_time": "2025-03-14T10:00:00Z"
        });
        assert!(serde_json::from_value::<LifecycleEvent>(payload).is_err());
    }

    #[test]
    fn test_recipients_by_kind() {
        let event = LifecycleEvent::from(booked());
        assert_eq!(event.recipients(), &[Recipient::User, Recipient::Admin]);

        let inquiry =
            LifecycleEvent::from(ServiceInquiry::new("Aino", "aino@example.fi", "+358", "Hei"));
        assert_eq!(inquiry.recipients(), &[Recipient::Admin]);
        assert_eq!(inquiry.kind(), EventKind::Inquiry);
    }

    #[test]
    fn test_inquiry_identity_survives_redelivery() {
        let inquiry =
            LifecycleEvent::from(ServiceInquiry::new("Aino", "aino@example.fi", "+358", "Hei"));
        let redelivered: LifecycleEvent =
            serde_json::from_value(serde_json::to_value(&inquiry).unwrap()).unwrap();
        assert_eq!(inquiry.event_id(), redelivered.event_id());
    }

    #[test]
    fn test_inquiry_without_id_gets_stable_identity() {
        let payload = json!({
            "kind": "inquiry",
            "name": "Aino",
            "email": "aino@example.fi",
            "phone": "+358401234567",
            "message": "Onko lauantaina aikoja?"
        });
        let first: LifecycleEvent = serde_json::from_value(payload.clone()).unwrap();
        let again: LifecycleEvent = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(first.event_id(), again.event_id());
        assert_eq!(first.clone().with_identity().event_id(), first.event_id());

        let mut other = payload;
        other["message"] = json!("Entä sunnuntaina?");
        let other: LifecycleEvent = serde_json::from_value(other).unwrap();
        assert_ne!(first.event_id(), other.event_id());
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(Recipient::Admin.to_string(), "admin");
        assert_eq!("user".parse::<Recipient>().unwrap(), Recipient::User);
        assert!("staff".parse::<Recipient>().is_err());
        assert_eq!("cancelled".parse::<EventKind>().unwrap(), EventKind::Cancelled);
    }
}
