//! Delayed re-submission of failed tasks.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::RetryPolicy;
use crate::domain::{Task, TaskState};
use crate::lifecycle::AdmissionGate;
use crate::queue::BoundedQueue;
use crate::store::TaskStore;

/// Retry entry for the timer heap.
///
/// Reverse ordering on `(due, seq)` so `BinaryHeap` pops the earliest first.
#[derive(Debug)]
struct ScheduledRetry {
    due: Instant,
    seq: u64,
    task: Task,
    attempt: u32,
}

impl PartialEq for ScheduledRetry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledRetry {}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct PendingRetries {
    /// Retries whose delay has not elapsed yet.
    heap: BinaryHeap<ScheduledRetry>,
    /// Due retries waiting for a queue slot, in deadline order.
    blocked: VecDeque<ScheduledRetry>,
    next_seq: u64,
    /// Set once the driver stopped; later retries fail immediately.
    closed: bool,
}

/// Schedules retries on a single timer heap driven by one task.
///
/// Every scheduled retry ends in exactly one of:
/// - re-entering the queue, or
/// - `TaskState::Failed` (admission closed, or cancelled before re-entering).
///
/// 期限が来たのにキューが満杯のリトライは `blocked` に並べ、ドライバ自体は
/// 止めない。ゲートが閉じたら待機中のものも含めてその場で failed にする。
pub struct RetryScheduler {
    policy: RetryPolicy,
    store: Arc<dyn TaskStore>,
    queue: Arc<BoundedQueue>,
    gate: Arc<AdmissionGate>,
    cancel: CancellationToken,
    pending: Mutex<PendingRetries>,
    wake: Notify,
}

impl RetryScheduler {
    pub fn new(
        policy: RetryPolicy,
        store: Arc<dyn TaskStore>,
        queue: Arc<BoundedQueue>,
        gate: Arc<AdmissionGate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policy,
            store,
            queue,
            gate,
            cancel,
            pending: Mutex::new(PendingRetries::default()),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingRetries> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retries not resolved yet: still timing, or due and waiting for room.
    pub fn pending(&self) -> usize {
        let pending = self.lock();
        pending.heap.len() + pending.blocked.len()
    }

    /// Arrange a delayed re-submission of `task` and return the chosen delay.
    ///
    /// Never blocks the caller.
    pub fn schedule(&self, task: Task, attempt: u32) -> Duration {
        let delay = self.policy.next_delay(attempt, &mut rand::thread_rng());

        let mut pending = self.lock();
        if pending.closed {
            drop(pending);
            warn!(task_id = %task.id, attempt, "retry scheduler stopped; marking failed");
            self.store.set_state(&task.id, TaskState::Failed);
            return delay;
        }

        let seq = pending.next_seq;
        pending.next_seq += 1;
        debug!(
            task_id = %task.id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retry timer armed"
        );
        pending.heap.push(ScheduledRetry {
            due: Instant::now() + delay,
            seq,
            task,
            attempt,
        });
        drop(pending);

        self.wake.notify_one();
        delay
    }

    /// Driver loop. Returns after cancellation, once every pending retry is resolved.
    ///
    /// Wakes on the next deadline, a new `schedule`, the gate closing, or a
    /// queue slot freeing up while retries are blocked.
    pub async fn run(self: Arc<Self>) {
        loop {
            let wake = self.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            if self.cancel.is_cancelled() {
                break;
            }

            // read before release_due so a close in between still wakes us
            let accepting = self.gate.is_accepting();
            for retry in self.release_due(Instant::now()) {
                info!(
                    task_id = %retry.task.id,
                    attempt = retry.attempt,
                    "not re-enqueuing because service is shutting down; marking failed"
                );
                self.store.set_state(&retry.task.id, TaskState::Failed);
            }

            let (next_due, blocked) = {
                let pending = self.lock();
                (pending.heap.peek().map(|retry| retry.due), !pending.blocked.is_empty())
            };
            let sleep = async {
                match next_due {
                    Some(due) => tokio::time::sleep_until(due).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.gate.closed(), if accepting => {}
                _ = &mut wake => {}
                _ = self.queue.wait_for_room(), if blocked => {}
                _ = sleep => {}
            }
        }

        self.abandon_pending();
    }

    /// Move due retries behind any already blocked ones, then push as many as
    /// the queue takes. Returns the retries to fail because admission is closed.
    fn release_due(&self, now: Instant) -> Vec<ScheduledRetry> {
        let mut pending = self.lock();
        while pending.heap.peek().is_some_and(|retry| retry.due <= now) {
            if let Some(retry) = pending.heap.pop() {
                pending.blocked.push_back(retry);
            }
        }

        if !self.gate.is_accepting() {
            return pending.blocked.drain(..).collect();
        }

        while !pending.blocked.is_empty() {
            let Ok(permit) = self.queue.try_reserve() else {
                break;
            };
            if let Some(ScheduledRetry { task, attempt, .. }) = pending.blocked.pop_front() {
                info!(task_id = %task.id, attempt, "re-enqueued");
                permit.send(task);
            }
        }
        Vec::new()
    }

    fn abandon_pending(&self) {
        let abandoned: Vec<ScheduledRetry> = {
            let mut pending = self.lock();
            pending.closed = true;
            let mut abandoned: Vec<ScheduledRetry> = pending.blocked.drain(..).collect();
            abandoned.extend(pending.heap.drain());
            abandoned
        };

        for retry in abandoned {
            info!(
                task_id = %retry.task.id,
                attempt = retry.attempt,
                "retry cancelled due to shutdown"
            );
            self.store.set_state(&retry.task.id, TaskState::Failed);
        }
    }
}
