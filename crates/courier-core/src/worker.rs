use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Task, TaskState};
use crate::error::HandlerError;
use crate::lifecycle::ActiveWork;
use crate::queue::BoundedQueue;
use crate::retry::RetryScheduler;
use crate::runtime::TaskHandler;
use crate::store::TaskStore;

/// Everything a worker loop needs, shared by all workers.
pub(crate) struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<BoundedQueue>,
    pub handler: Arc<dyn TaskHandler>,
    pub retries: Arc<RetryScheduler>,
    pub active: Arc<ActiveWork>,
    pub cancel: CancellationToken,
}

/// Fixed set of worker loops.
/// - cancellation token を cancel するとワーカー全体が止まる
/// - `join()` で全ワーカーの終了を待てる
pub(crate) struct WorkerPool {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, ctx: Arc<WorkerContext>) -> Self {
        let joins = (0..n)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, Arc::clone(&ctx))))
            .collect();
        Self { joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    /// Wait for every worker to observe cancellation and exit.
    pub async fn join(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                warn!("worker task ended abnormally: {e}");
            }
        }
    }
}

async fn worker_loop(worker_id: usize, ctx: Arc<WorkerContext>) {
    info!(worker = worker_id, "worker started");
    loop {
        // receive は待つ可能性があるので select で cancel と競合させる
        let task = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            task = ctx.queue.receive() => task,
        };

        // ここから先は cancel されても最後まで実行する
        process_task(worker_id, &ctx, task).await;
    }
    info!(worker = worker_id, "worker exiting");
}

pub(crate) async fn process_task(worker_id: usize, ctx: &WorkerContext, task: Task) {
    let _active = ctx.active.begin();

    ctx.store.set_state(&task.id, TaskState::Running);
    info!(worker = worker_id, task_id = %task.id, "started task");

    // handler の panic はワーカーを殺さず、通常の失敗として扱う
    let outcome = AssertUnwindSafe(ctx.handler.handle(&task))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(HandlerError::new(task.id.clone(), panic_message(&*payload)))
        });

    let err = match outcome {
        Ok(()) => {
            ctx.store.set_state(&task.id, TaskState::Done);
            info!(worker = worker_id, task_id = %task.id, "finished task (done)");
            return;
        }
        Err(err) => err,
    };

    let attempts = ctx.store.increment_attempts(&task.id);
    warn!(worker = worker_id, task_id = %task.id, attempts, error = %err, "task failed");

    if attempts > task.max_retries {
        ctx.store.set_state(&task.id, TaskState::Failed);
        warn!(worker = worker_id, task_id = %task.id, attempts, "permanently failed task");
        return;
    }

    // Mark queued first: the scheduler may resolve the retry to Failed right away
    // (during shutdown) and that write must win.
    ctx.store.set_state(&task.id, TaskState::Queued);
    let task_id = task.id.clone();
    let backoff = ctx.retries.schedule(task, attempts);
    info!(
        worker = worker_id,
        %task_id,
        attempts,
        backoff_ms = backoff.as_millis() as u64,
        "retry scheduled"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload");
    format!("handler panicked: {detail}")
}
