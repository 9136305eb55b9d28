//! # Lifecycle Events
//!
//! Event payloads and the publisher that hands them to the pipeline.

pub mod publisher;
pub mod types;

pub use publisher::{NotificationPublisher, PublishReceipt};
pub use types::{
    BookedAppointment, CancelledAppointment, EventKind, LifecycleEvent, Recipient, ServiceInquiry,
};
