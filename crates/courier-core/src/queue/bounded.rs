//! Bounded FIFO of pending tasks.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::domain::Task;
use crate::error::EnqueueError;

struct QueueState {
    items: VecDeque<Task>,

    /// Slots claimed by a `SendPermit` that has not sent yet.
    reserved: usize,

    /// Receivers currently parked in `receive()`.
    waiting: usize,
}

/// Fixed-capacity FIFO channel of tasks.
///
/// # Capacity
/// An item may be admitted while `items + reserved < capacity + waiting`:
/// an idle receiver counts as one extra slot because the item is handed to it
/// right away. With `capacity == 0` this gives rendezvous semantics.
///
/// - `try_reserve` / `try_send`: never block, `QueueFull` when saturated.
/// - `wait_for_room`: resolves once `try_reserve` could succeed (retry path).
/// - `receive`: waits for an item; cancel-safe inside `select!`.
///
/// 内部 Mutex は同期処理の中だけで握る（await を跨がない）。
pub struct BoundedQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    item_ready: Notify,
    space_ready: Notify,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                reserved: 0,
                waiting: 0,
            }),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks sitting in the queue.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receivers currently waiting for an item.
    pub fn idle_receivers(&self) -> usize {
        self.lock().waiting
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_room(&self, state: &QueueState) -> bool {
        state.items.len() + state.reserved < self.capacity + state.waiting
    }

    /// Claim a slot without blocking.
    pub fn try_reserve(&self) -> Result<SendPermit<'_>, EnqueueError> {
        let mut state = self.lock();
        if !self.has_room(&state) {
            return Err(EnqueueError::QueueFull);
        }
        state.reserved += 1;
        Ok(SendPermit {
            queue: self,
            sent: false,
        })
    }

    pub fn try_send(&self, task: Task) -> Result<(), EnqueueError> {
        self.try_reserve()?.send(task);
        Ok(())
    }

    /// Wait until a slot could be claimed.
    ///
    /// Another sender may take the slot first, so callers retry `try_reserve`.
    pub async fn wait_for_room(&self) {
        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            if self.has_room(&self.lock()) {
                return;
            }
            space.await;
        }
    }

    /// Wait for the next task in FIFO order.
    pub async fn receive(&self) -> Task {
        let mut waiter = Waiter::register(self);
        loop {
            let ready = self.item_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(task) = state.items.pop_front() {
                    state.waiting -= 1;
                    waiter.registered = false;
                    return task;
                }
            }

            ready.await;
        }
    }
}

/// A claimed queue slot.
///
/// Dropping it without `send` releases the slot.
pub struct SendPermit<'a> {
    queue: &'a BoundedQueue,
    sent: bool,
}

impl SendPermit<'_> {
    pub fn send(mut self, task: Task) {
        {
            let mut state = self.queue.lock();
            state.reserved -= 1;
            state.items.push_back(task);
        }
        self.sent = true;
        self.queue.item_ready.notify_one();
    }
}

impl Drop for SendPermit<'_> {
    fn drop(&mut self) {
        if self.sent {
            return;
        }
        self.queue.lock().reserved -= 1;
        self.queue.space_ready.notify_one();
    }
}

/// Counts a receiver as waiting for as long as it sits in `receive()`.
struct Waiter<'a> {
    queue: &'a BoundedQueue,
    registered: bool,
}

impl<'a> Waiter<'a> {
    fn register(queue: &'a BoundedQueue) -> Self {
        queue.lock().waiting += 1;
        // an idle receiver is one more slot
        queue.space_ready.notify_one();
        Self {
            queue,
            registered: true,
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.registered {
            self.queue.lock().waiting -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(id: &str) -> Task {
        Task::new(id, "", 0)
    }

    async fn wait_for_idle_receivers(queue: &BoundedQueue, n: usize) {
        while queue.idle_receivers() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn try_send_rejects_when_full() {
        let queue = BoundedQueue::new(1);
        assert!(queue.try_send(task("x")).is_ok());
        assert_eq!(queue.try_send(task("y")), Err(EnqueueError::QueueFull));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn receive_is_fifo() {
        let queue = BoundedQueue::new(3);
        for id in ["a", "b", "c"] {
            queue.try_send(task(id)).unwrap();
        }
        assert_eq!(queue.receive().await.id.as_str(), "a");
        assert_eq!(queue.receive().await.id.as_str(), "b");
        assert_eq!(queue.receive().await.id.as_str(), "c");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_rejects_without_idle_receiver() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.try_send(task("x")), Err(EnqueueError::QueueFull));
    }

    #[tokio::test]
    async fn zero_capacity_hands_off_to_idle_receiver() {
        let queue = Arc::new(BoundedQueue::new(0));
        let receiver = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.receive().await }
        });
        wait_for_idle_receivers(&queue, 1).await;

        assert!(queue.try_send(task("first")).is_ok());
        assert_eq!(queue.try_send(task("second")), Err(EnqueueError::QueueFull));

        let got = receiver.await.unwrap();
        assert_eq!(got.id.as_str(), "first");
        assert_eq!(queue.idle_receivers(), 0);
    }

    #[tokio::test]
    async fn dropped_permit_releases_slot() {
        let queue = BoundedQueue::new(1);
        let permit = queue.try_reserve().unwrap();
        assert_eq!(queue.try_send(task("x")), Err(EnqueueError::QueueFull));
        drop(permit);
        assert!(queue.try_send(task("x")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_room_resolves_when_receiver_frees_a_slot() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.try_send(task("first")).unwrap();

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.wait_for_room().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        assert_eq!(queue.receive().await.id.as_str(), "first");
        waiter.await.unwrap();
        assert!(queue.try_send(task("second")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_room_wakes_on_dropped_permit() {
        let queue = Arc::new(BoundedQueue::new(1));
        let permit = queue.try_reserve().unwrap();

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.wait_for_room().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_receiver_is_no_longer_counted() {
        let queue = Arc::new(BoundedQueue::new(0));
        let receiver = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.receive().await }
        });
        wait_for_idle_receivers(&queue, 1).await;

        receiver.abort();
        let _ = receiver.await;

        assert_eq!(queue.idle_receivers(), 0);
        assert_eq!(queue.try_send(task("x")), Err(EnqueueError::QueueFull));
    }
}
