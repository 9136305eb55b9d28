//! # Registry
//!
//! The queue registry and the stage types it stores.

pub mod queue_registry;
pub mod stage;

pub use queue_registry::{QueueDescriptor, QueueOptions, QueueRegistry};
pub use stage::{CompletionSignal, JobHandler, StageLink};
