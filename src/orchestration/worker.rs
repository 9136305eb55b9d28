//! # Queue Worker
//!
//! Polling consumer for one pipeline queue.
//!
//! ## Architecture
//!
//! - **Polling Loop**: `tokio::time::interval` between polls while running
//! - **Backpressure Control**: semaphore-bounded concurrent jobs per batch
//! - **Slow Jobs**: a job still running after `job_timeout` is logged, never
//!   cancelled; a dropped send would strand its ledger claim in `sending`.
//!   The visibility timeout is what hands an abandoned job to another worker
//! - **Outcome Handling**:
//!   success -> publish completion signal (if anything listens) -> ack;
//!   retryable failure -> leave for redelivery after the visibility timeout;
//!   non-retryable failure or exhausted attempts -> dead-letter
//!
//! A worker runs in one of two modes. A *job* worker executes the queue's
//! [`JobHandler`]. A *completion* worker consumes the upstream queue's
//! `<upstream>_completed` signals and enqueues the next stage's job.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::constants::queues::completion_queue;
use crate::error::{NotifierError, NotifierResult};
use crate::logging::{log_error, log_queue_operation};
use crate::messaging::{enqueue_json, JobQueue, ReceivedJob};
use crate::registry::{CompletionSignal, JobHandler, QueueDescriptor, QueueRegistry, StageLink};

/// What happened to one received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    Acked,
    /// Left in the queue; it reappears after the visibility timeout
    Retrying,
    DeadLettered,
}

#[derive(Clone)]
enum WorkerMode {
    Jobs(Arc<dyn JobHandler>),
    Completions(StageLink),
}

/// Statistics for worker observability
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub polling_cycles: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_dead_lettered: AtomicU64,
}

impl WorkerStats {
    pub fn get_polling_cycles(&self) -> u64 {
        self.polling_cycles.load(Ordering::Relaxed)
    }

    pub fn get_jobs_succeeded(&self) -> u64 {
        self.jobs_succeeded.load(Ordering::Relaxed)
    }

    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn get_jobs_dead_lettered(&self) -> u64 {
        self.jobs_dead_lettered.load(Ordering::Relaxed)
    }
}

pub struct QueueWorker {
    /// Queue this worker receives from
    source_queue: String,
    /// The registered queue this worker serves
    descriptor: Arc<QueueDescriptor>,
    mode: WorkerMode,
    queue: Arc<dyn JobQueue>,
    registry: Arc<QueueRegistry>,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl std::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWorker")
            .field("source_queue", &self.source_queue)
            .field("stage", &self.descriptor.name)
            .finish()
    }
}

impl QueueWorker {
    /// Workers needed to serve `descriptor`: one for its jobs, one for its
    /// upstream completion signals
    pub fn for_descriptor(
        descriptor: Arc<QueueDescriptor>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<QueueRegistry>,
        config: &WorkerConfig,
    ) -> Vec<Arc<QueueWorker>> {
        let mut workers = Vec::new();

        if let Some(handler) = &descriptor.worker {
            workers.push(Arc::new(Self {
                source_queue: descriptor.name.clone(),
                descriptor: descriptor.clone(),
                mode: WorkerMode::Jobs(handler.clone()),
                queue: queue.clone(),
                registry: registry.clone(),
                config: config.clone(),
                stats: Arc::new(WorkerStats::default()),
            }));
        }

        if let Some(link) = &descriptor.listens_for_completion_of {
            workers.push(Arc::new(Self {
                source_queue: completion_queue(link.upstream()),
                descriptor: descriptor.clone(),
                mode: WorkerMode::Completions(link.clone()),
                queue,
                registry,
                config: config.clone(),
                stats: Arc::new(WorkerStats::default()),
            }));
        }

        workers
    }

    pub fn source_queue(&self) -> &str {
        &self.source_queue
    }

    pub fn stage(&self) -> &str {
        &self.descriptor.name
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Poll until `running` is cleared
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) {
        info!(
            queue = %self.source_queue,
            stage = %self.descriptor.name,
            poll_interval = ?self.config.poll_interval(),
            "Starting queue worker"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());
        while running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.stats.polling_cycles.fetch_add(1, Ordering::Relaxed);

            if let Err(e) = self.poll_once().await {
                warn!(queue = %self.source_queue, error = %e, "Poll iteration failed");
            }
        }

        info!(queue = %self.source_queue, "Queue worker stopped");
    }

    /// Receive and process one batch; returns how many messages were received
    #[instrument(skip(self), fields(queue = %self.source_queue))]
    pub async fn poll_once(self: &Arc<Self>) -> NotifierResult<usize> {
        let jobs = self
            .queue
            .receive(
                &self.source_queue,
                self.config.batch_size,
                self.config.visibility_timeout(),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        debug!(count = jobs.len(), "Processing batch");
        let count = jobs.len();
        self.process_batch(jobs).await?;
        Ok(count)
    }

    async fn process_batch(self: &Arc<Self>, jobs: Vec<ReceivedJob>) -> NotifierResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                NotifierError::Messaging(format!("Failed to acquire semaphore permit: {e}"))
            })?;

            let worker = self.clone();
            handles.push(tokio::spawn(async move {
                let disposition = worker.process_job(job).await;
                drop(permit);
                disposition
            }));
        }

        for (idx, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(task_index = idx, error = %e, "Job processing task panicked");
            }
        }

        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = job.message_id, attempt = job.read_count))]
    pub async fn process_job(&self, job: ReceivedJob) -> JobDisposition {
        if job.read_count > self.config.max_attempts {
            let error = NotifierError::Messaging(format!(
                "delivered {} times, exceeding max_attempts {}",
                job.read_count, self.config.max_attempts
            ));
            return self.dead_letter(&job, &error).await;
        }

        let execution = self.execute(&job);
        tokio::pin!(execution);
        let result = tokio::select! {
            result = &mut execution => result,
            _ = tokio::time::sleep(self.config.job_timeout()) => {
                warn!(
                    job_timeout = ?self.config.job_timeout(),
                    "Job exceeded job_timeout, waiting for it to finish"
                );
                execution.await
            }
        };

        match result {
            Ok(()) => match self.queue.ack(&self.source_queue, job.message_id).await {
                Ok(()) => {
                    self.stats.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
                    log_queue_operation("ack", &self.source_queue, Some(job.message_id), "completed", None);
                    JobDisposition::Acked
                }
                Err(e) => {
                    // Redelivery is absorbed by the ledger and idempotent stages
                    warn!(error = %e, "Failed to acknowledge completed job");
                    JobDisposition::Retrying
                }
            },
            Err(error) => {
                self.stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
                if !error.is_retryable() || job.read_count >= self.config.max_attempts {
                    return self.dead_letter(&job, &error).await;
                }

                warn!(
                    error = %error,
                    remaining_attempts = self.config.max_attempts - job.read_count,
                    "Job failed, leaving for redelivery"
                );
                JobDisposition::Retrying
            }
        }
    }

    async fn execute(&self, job: &ReceivedJob) -> NotifierResult<()> {
        match &self.mode {
            WorkerMode::Jobs(handler) => {
                let result = handler.handle(job).await?;
                self.publish_completion(job, result).await
            }
            WorkerMode::Completions(link) => {
                let signal: CompletionSignal = serde_json::from_value(job.payload.clone())
                    .map_err(|e| {
                        NotifierError::InvalidPayload(format!("completion signal: {e}"))
                    })?;
                let payload = link.next_payload(&signal)?;
                let message_id = self.queue.enqueue(&self.descriptor.name, &payload).await?;
                log_queue_operation(
                    "chain",
                    &self.descriptor.name,
                    Some(message_id),
                    "enqueued",
                    Some(&format!("after {} job {}", signal.queue, signal.job_id)),
                );
                Ok(())
            }
        }
    }

    /// Durable signal that drives downstream stages; published before the ack
    async fn publish_completion(&self, job: &ReceivedJob, result: Value) -> NotifierResult<()> {
        if !self.registry.has_listeners(&self.descriptor.name) {
            return Ok(());
        }

        let signal = CompletionSignal::for_job(job, result);
        enqueue_json(
            self.queue.as_ref(),
            &completion_queue(&self.descriptor.name),
            &signal,
        )
        .await?;
        Ok(())
    }

    async fn dead_letter(&self, job: &ReceivedJob, error: &NotifierError) -> JobDisposition {
        log_error(
            "queue_worker",
            "dead_letter",
            &error.to_string(),
            Some(&format!(
                "queue={} job_id={} attempt={}",
                self.source_queue, job.message_id, job.read_count
            )),
        );

        match self.queue.dead_letter(&self.source_queue, job.message_id).await {
            Ok(()) => {
                self.stats.jobs_dead_lettered.fetch_add(1, Ordering::Relaxed);
                JobDisposition::DeadLettered
            }
            Err(e) => {
                error!(error = %e, "Failed to dead-letter job");
                JobDisposition::Retrying
            }
        }
    }
}
