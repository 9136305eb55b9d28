//! # Queue Registry
//!
//! Process-scoped table of named queues, the worker bound to each, and the
//! upstream queue each one listens to. Populated during bootstrap, then
//! sealed; the worker loops only read it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::stage::{JobHandler, StageLink};
use crate::constants::queues::completion_queue;
use crate::error::{NotifierError, NotifierResult};
use crate::messaging::validate_queue_name;

/// Registration options for one queue
#[derive(Clone, Default)]
pub struct QueueOptions {
    pub worker: Option<Arc<dyn JobHandler>>,
    pub listens_for_completion_of: Option<StageLink>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.worker = Some(handler);
        self
    }

    pub fn listens_to(mut self, link: StageLink) -> Self {
        self.listens_for_completion_of = Some(link);
        self
    }
}

/// Immutable once registered
#[derive(Clone)]
pub struct QueueDescriptor {
    pub name: String,
    pub worker: Option<Arc<dyn JobHandler>>,
    pub listens_for_completion_of: Option<StageLink>,
}

impl QueueDescriptor {
    pub fn completion_queue(&self) -> String {
        completion_queue(&self.name)
    }
}

impl fmt::Debug for QueueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDescriptor")
            .field("name", &self.name)
            .field("worker", &self.worker.as_ref().map(|w| w.handler_name().to_string()))
            .field("listens_for_completion_of", &self.listens_for_completion_of)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: RwLock<HashMap<String, Arc<QueueDescriptor>>>,
    sealed: AtomicBool,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue; re-registering a name returns the existing descriptor
    pub fn register(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> NotifierResult<Arc<QueueDescriptor>> {
        if self.is_sealed() {
            return Err(NotifierError::configuration(format!(
                "cannot register queue '{name}' after the registry was sealed"
            )));
        }

        validate_queue_name(name)?;
        validate_queue_name(&completion_queue(name))?;

        let mut queues = self.queues.write();
        if let Some(existing) = queues.get(name) {
            debug!(queue = %name, "Queue already registered");
            return Ok(existing.clone());
        }

        let descriptor = Arc::new(QueueDescriptor {
            name: name.to_string(),
            worker: options.worker,
            listens_for_completion_of: options.listens_for_completion_of,
        });
        queues.insert(name.to_string(), descriptor.clone());

        info!(
            queue = %name,
            has_worker = descriptor.worker.is_some(),
            upstream = descriptor.listens_for_completion_of.as_ref().map(|l| l.upstream()),
            "Registered queue"
        );
        Ok(descriptor)
    }

    /// Fails with a configuration error for names that were never registered
    pub fn lookup(&self, name: &str) -> NotifierResult<Arc<QueueDescriptor>> {
        self.queues.read().get(name).cloned().ok_or_else(|| {
            NotifierError::configuration(format!("queue '{name}' is not registered"))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.read().contains_key(name)
    }

    /// End the registration phase after checking every link's upstream exists
    ///
    /// A completion queue is consumed by exactly one listener, so two stages
    /// may not follow the same upstream.
    pub fn seal(&self) -> NotifierResult<()> {
        let queues = self.queues.read();
        let mut followed = HashSet::new();
        for descriptor in queues.values() {
            if let Some(link) = &descriptor.listens_for_completion_of {
                if !queues.contains_key(link.upstream()) {
                    return Err(NotifierError::configuration(format!(
                        "queue '{}' listens to unregistered queue '{}'",
                        descriptor.name,
                        link.upstream()
                    )));
                }
                if !followed.insert(link.upstream()) {
                    return Err(NotifierError::configuration(format!(
                        "more than one queue listens to '{}'",
                        link.upstream()
                    )));
                }
            }
        }
        self.sealed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// All registered names, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Queues that chain off `name`'s completion signals
    pub fn listeners_of(&self, name: &str) -> Vec<Arc<QueueDescriptor>> {
        let mut listeners: Vec<_> = self
            .queues
            .read()
            .values()
            .filter(|d| {
                d.listens_for_completion_of
                    .as_ref()
                    .is_some_and(|link| link.upstream() == name)
            })
            .cloned()
            .collect();
        listeners.sort_by(|a, b| a.name.cmp(&b.name));
        listeners
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.queues.read().values().any(|d| {
            d.listens_for_completion_of
                .as_ref()
                .is_some_and(|link| link.upstream() == name)
        })
    }

    /// Every queue name the transport must create, completion queues included
    pub fn physical_queue_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for name in self.queue_names() {
            if self.has_listeners(&name) {
                names.push(completion_queue(&name));
            }
            names.push(name);
        }
        names
    }
}
