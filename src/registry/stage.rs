//! Stage building blocks: job handlers, completion signals and the links
//! that chain one queue to another.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NotifierResult;
use crate::messaging::{MessageId, ReceivedJob};

/// Work bound to a queue
///
/// Returning `Ok` acknowledges the job and publishes a completion signal
/// carrying the returned value. Returning `Err` leaves the job to the
/// transport's retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &ReceivedJob) -> NotifierResult<Value>;

    fn handler_name(&self) -> &str;
}

/// Durable record that a job on `queue` succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub queue: String,
    pub job_id: MessageId,
    /// The completed job's payload
    pub payload: Value,
    /// What the handler returned
    pub result: Value,
    pub completed_at: DateTime<Utc>,
}

impl CompletionSignal {
    pub fn for_job(job: &ReceivedJob, result: Value) -> Self {
        Self {
            queue: job.queue_name.clone(),
            job_id: job.message_id,
            payload: job.payload.clone(),
            result,
            completed_at: Utc::now(),
        }
    }
}

type PayloadMapper = Arc<dyn Fn(&CompletionSignal) -> NotifierResult<Value> + Send + Sync>;

/// "When `upstream` completes, enqueue a job on me"
#[derive(Clone)]
pub struct StageLink {
    upstream: String,
    mapper: Option<PayloadMapper>,
}

impl StageLink {
    /// Forward the completed job's payload unchanged
    pub fn forward(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            mapper: None,
        }
    }

    pub fn with_mapper<F>(upstream: impl Into<String>, mapper: F) -> Self
    where
        F: Fn(&CompletionSignal) -> NotifierResult<Value> + Send + Sync + 'static,
    {
        Self {
            upstream: upstream.into(),
            mapper: Some(Arc::new(mapper)),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Payload of the job this stage enqueues for `signal`
    pub fn next_payload(&self, signal: &CompletionSignal) -> NotifierResult<Value> {
        match &self.mapper {
            Some(mapper) => mapper(signal),
            None => Ok(signal.payload.clone()),
        }
    }
}

impl fmt::Debug for StageLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageLink")
            .field("upstream", &self.upstream)
            .field("mapped", &self.mapper.is_some())
            .finish()
    }
}
