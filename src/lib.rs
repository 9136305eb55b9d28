#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Booking Notifier
//!
//! Queue-driven email notifications for appointment bookings, with an
//! at-most-once send guarantee on top of an at-least-once job transport.
//!
//! ## Overview
//!
//! The booking service publishes lifecycle events (booked, cancelled,
//! inquiry) as jobs. Queue workers pick them up and, for every recipient the
//! event names, run the delivery ledger protocol before touching the mail
//! API. A redelivered or concurrently executed job therefore never produces a
//! second email for the same (event, recipient, kind) unit.
//!
//! ## Architecture
//!
//! - **Delivery ledger**: one row per unit with a `pending -> sending -> sent | failed`
//!   state machine and an atomic conditional claim
//! - **Executor**: get-or-create, claim, compose, send, record
//! - **Queue registry**: stages declare a handler and, optionally, which
//!   upstream queue's completion they follow
//! - **Durable chaining**: successful jobs publish a completion signal to
//!   `<queue>_completed` before they are acknowledged; listening stages
//!   consume those signals to enqueue their own jobs
//!
//! ## Module Organization
//!
//! - [`ledger`] - Delivery ledger contract, PostgreSQL and in-memory stores
//! - [`executor`] - The claim-then-send protocol
//! - [`mail`] - Transport, templates and message composition
//! - [`messaging`] - Job queue abstraction over pgmq
//! - [`registry`] - Queue registration and stage links
//! - [`orchestration`] - Queue workers and the default pipeline
//! - [`events`] - Lifecycle event types and the publisher
//! - [`config`] - Layered configuration
//! - [`error`] - Tagged error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use booking_notifier::bootstrap::{BootstrapConfig, NotificationBootstrap};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = NotificationBootstrap::bootstrap(BootstrapConfig::default()).await?;
//! // ... run until shutdown is requested
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                     # Unit and in-memory integration tests
//! cargo test -- --ignored        # PostgreSQL tests (requires DATABASE_URL)
//! ```
//!
//! Fixtures and in-memory doubles live in `test_utils`, compiled only for
//! tests or with the `test-utils` feature.

pub mod appointments;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod mail;
pub mod messaging;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod system_context;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bootstrap::{BootstrapConfig, NotificationBootstrap, NotificationWorkerHandle};
pub use config::{ConfigManager, NotifierConfig};
pub use error::{ErrorKind, NotifierError, NotifierResult};
pub use events::{
    BookedAppointment, CancelledAppointment, EventKind, LifecycleEvent, NotificationPublisher,
    Recipient, ServiceInquiry,
};
pub use executor::{DeliveryOutcome, NotificationExecutor};
pub use ledger::{DeliveryLedger, DeliveryLedgerEntry, InMemoryDeliveryLedger, LedgerKey};
pub use state_machine::DeliveryStatus;
pub use system_context::SystemContext;
