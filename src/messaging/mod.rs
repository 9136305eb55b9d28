//! # Messaging Module
//!
//! The at-least-once job transport the pipeline runs on. Providers:
//!
//! - [`PgmqJobQueue`] - PostgreSQL message queue (pgmq) for production
//! - [`InMemoryJobQueue`] - visibility-timeout simulation for tests and development

pub mod errors;
pub mod in_memory;
pub mod pgmq_client;
pub mod traits;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryJobQueue;
pub use pgmq_client::PgmqJobQueue;
pub use traits::{enqueue_json, validate_queue_name, JobQueue, MessageId, ReceivedJob};
