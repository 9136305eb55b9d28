//! # Pipeline Orchestration
//!
//! Turns the sealed [`QueueRegistry`] into running queue workers and chains
//! stages through durable completion signals.
//!
//! ## Chaining
//!
//! When a job on queue `Q` succeeds and some stage listens to `Q`, the worker
//! publishes a [`CompletionSignal`](crate::registry::CompletionSignal) to
//! `Q_completed` and only then acknowledges the job. The listening stage's
//! completion worker consumes `Q_completed`, derives the next payload with its
//! [`StageLink`](crate::registry::StageLink), enqueues it on its own queue and
//! acknowledges the signal. Every hand-off is therefore reconstructed from
//! durable queue state, never from process memory.

pub mod handlers;
pub mod pipeline;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::error::{NotifierError, NotifierResult};
use crate::messaging::JobQueue;
use crate::registry::QueueRegistry;

pub use handlers::{ConfirmEmailHandler, NotifyHandler};
pub use pipeline::register_default_pipeline;
pub use worker::{JobDisposition, QueueWorker, WorkerStats};

pub struct PipelineOrchestrator {
    queue: Arc<dyn JobQueue>,
    registry: Arc<QueueRegistry>,
    config: WorkerConfig,
    workers: Vec<Arc<QueueWorker>>,
    running: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("workers", &self.workers)
            .field("running", &self.is_running())
            .finish()
    }
}

impl PipelineOrchestrator {
    /// Build one worker per queue handler and per completion listener
    ///
    /// The registry must be sealed so the worker set cannot drift from it.
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<QueueRegistry>,
        config: WorkerConfig,
    ) -> NotifierResult<Self> {
        if !registry.is_sealed() {
            return Err(NotifierError::configuration(
                "queue registry must be sealed before workers are built",
            ));
        }

        let mut workers = Vec::new();
        for name in registry.queue_names() {
            let descriptor = registry.lookup(&name)?;
            workers.extend(QueueWorker::for_descriptor(
                descriptor,
                queue.clone(),
                registry.clone(),
                &config,
            ));
        }

        Ok(Self {
            queue,
            registry,
            config,
            workers,
            running: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Create every stage queue and every completion queue
    pub async fn ensure_queues(&self) -> NotifierResult<()> {
        let names = self.registry.physical_queue_names();
        self.queue.ensure_queues(&names).await?;
        info!(count = names.len(), "Pipeline queues ready");
        Ok(())
    }

    pub fn workers(&self) -> &[Arc<QueueWorker>] {
        &self.workers
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn every worker loop
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Pipeline already running");
            return;
        }

        let mut handles = self.handles.lock();
        for worker in &self.workers {
            let worker = worker.clone();
            let running = self.running.clone();
            handles.push(tokio::spawn(worker.run(running)));
        }
        info!(workers = handles.len(), "Pipeline started");
    }

    /// Stop polling and wait for in-flight batches, up to the shutdown timeout
    pub async fn shutdown(&self) -> NotifierResult<()> {
        self.running.store(false, Ordering::SeqCst);
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return Ok(());
        }

        let joined = tokio::time::timeout(
            self.config.shutdown_timeout(),
            futures::future::join_all(handles),
        )
        .await;

        match joined {
            Ok(_) => {
                info!("Pipeline stopped");
                Ok(())
            }
            Err(_) => Err(NotifierError::Messaging(format!(
                "workers did not stop within {:?}",
                self.config.shutdown_timeout()
            ))),
        }
    }

    /// One poll of every worker; returns the number of messages received
    pub async fn poll_once(&self) -> NotifierResult<usize> {
        let mut received = 0;
        for worker in &self.workers {
            received += worker.poll_once().await?;
        }
        Ok(received)
    }

    /// Poll until a full round receives nothing, or `max_rounds` is reached
    ///
    /// Jobs left for retry stay invisible until their visibility timeout
    /// expires, so a drained pipeline may still hold failed jobs.
    pub async fn drain(&self, max_rounds: usize) -> NotifierResult<usize> {
        let mut total = 0;
        for _ in 0..max_rounds {
            let received = self.poll_once().await?;
            if received == 0 {
                break;
            }
            total += received;
        }
        Ok(total)
    }
}
