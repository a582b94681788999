//! Dispatcher: admission, worker pool, retries and shutdown, wired together.
//!
//! # フロー
//! 1. `enqueue`: admission check -> queue slot reserved -> store (queued) -> queue
//! 2. worker: receive -> store (running) -> handler -> done / retry / failed
//! 3. retry: backoff -> (delay) -> queue again, or failed on shutdown
//! 4. `shutdown`: stop accepting -> drain active work -> cancel -> join

mod builder;

pub use builder::{BuildError, DispatcherBuilder};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::domain::{Task, TaskId, TaskMeta, TaskState};
use crate::error::EnqueueError;
use crate::lifecycle::{ActiveWork, AdmissionGate};
use crate::observability::StateCounts;
use crate::queue::BoundedQueue;
use crate::retry::RetryScheduler;
use crate::runtime::TaskHandler;
use crate::store::TaskStore;
use crate::worker::{WorkerContext, WorkerPool};

struct Background {
    workers: WorkerPool,
    retry_driver: JoinHandle<()>,
}

/// In-process task dispatcher.
///
/// Submissions are admitted through [`Dispatcher::enqueue`]; everything that
/// happens afterwards (execution failures, retry exhaustion, abandoned retries)
/// is only visible as task state in the store.
pub struct Dispatcher {
    config: DispatcherConfig,
    store: Arc<dyn TaskStore>,
    queue: Arc<BoundedQueue>,
    gate: Arc<AdmissionGate>,
    active: Arc<ActiveWork>,
    retries: Arc<RetryScheduler>,
    handler: Arc<dyn TaskHandler>,
    cancel: CancellationToken,
    background: Mutex<Option<Background>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn TaskStore>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let gate = Arc::new(AdmissionGate::new());
        let cancel = CancellationToken::new();
        let retries = Arc::new(RetryScheduler::new(
            config.retry.clone(),
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&gate),
            cancel.clone(),
        ));

        Self {
            config,
            store,
            queue,
            gate,
            active: Arc::new(ActiveWork::new()),
            retries,
            handler,
            cancel,
            background: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    fn lock_background(&self) -> MutexGuard<'_, Option<Background>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the worker loops and the retry driver.
    ///
    /// Must be called from within a tokio runtime. A second call, or a call
    /// after shutdown, does nothing.
    pub fn start(&self) {
        let mut background = self.lock_background();
        if background.is_some() || self.cancel.is_cancelled() {
            warn!("dispatcher already started or shut down; ignoring start");
            return;
        }

        info!(
            workers = self.config.workers,
            queue_size = self.queue.capacity(),
            "starting dispatcher"
        );
        if self.config.workers == 0 {
            warn!("dispatcher started without workers; queued tasks will not run");
        }

        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            handler: Arc::clone(&self.handler),
            retries: Arc::clone(&self.retries),
            active: Arc::clone(&self.active),
            cancel: self.cancel.clone(),
        });

        *background = Some(Background {
            workers: WorkerPool::spawn(self.config.workers, ctx),
            retry_driver: tokio::spawn(Arc::clone(&self.retries).run()),
        });
    }

    /// Submit a task.
    ///
    /// Re-submitting a known id starts a new lineage (attempts reset to 0),
    /// even while an older lineage of that id is still executing.
    pub fn enqueue(&self, task: Task) -> Result<(), EnqueueError> {
        if task.id.is_empty() {
            return Err(EnqueueError::InvalidTask("id required".to_string()));
        }
        if !self.gate.is_accepting() {
            debug!(task_id = %task.id, "rejected: not accepting");
            return Err(EnqueueError::NotAccepting);
        }

        // 先に枠を確保してから store に書く（拒否されたタスクは store に残さない）
        let permit = self.queue.try_reserve().inspect_err(|_| {
            debug!(task_id = %task.id, "rejected: queue full");
        })?;

        self.store.create_or_update(task.clone(), TaskState::Queued);
        info!(task_id = %task.id, max_retries = task.max_retries, "enqueued");
        permit.send(task);
        Ok(())
    }

    pub fn is_accepting(&self) -> bool {
        self.gate.is_accepting()
    }

    /// Reject new submissions from now on. Idempotent.
    pub fn stop_accepting(&self) {
        self.gate.stop_accepting();
    }

    /// Stop accepting, wait for executing tasks, cancel workers and pending
    /// retries, then wait for all of them to exit.
    ///
    /// Returns once every worker and the retry driver are gone; pending retries
    /// are resolved to `Failed` by then. Tasks still sitting in the queue stay `Queued`.
    pub async fn shutdown(&self) {
        info!("shutdown initiated");
        self.stop_accepting();

        info!(active = self.active.count(), "shutdown: waiting for active tasks to finish");
        self.active.wait_idle().await;

        info!("shutdown: cancelling background work");
        self.cancel.cancel();

        let background = self.lock_background().take();
        if let Some(Background {
            workers,
            retry_driver,
        }) = background
        {
            debug!(workers = workers.len(), "shutdown: joining workers");
            workers.join().await;
            if let Err(e) = retry_driver.await {
                warn!("retry driver ended abnormally: {e}");
            }
        }

        let left = self.queue.len();
        if left > 0 {
            warn!(left, "shutdown: tasks left unprocessed in queue");
        }
        info!("shutdown complete");
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskMeta> {
        self.store.get(id)
    }

    pub fn dump_all(&self) -> HashMap<TaskId, TaskMeta> {
        self.store.dump_all()
    }

    pub fn counts(&self) -> StateCounts {
        self.store.counts_by_state()
    }

    /// Tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Workers parked waiting for a task.
    pub fn idle_workers(&self) -> usize {
        self.queue.idle_receivers()
    }

    /// Retries not yet re-enqueued or failed.
    pub fn pending_retries(&self) -> usize {
        self.retries.pending()
    }
}
