//! Lifecycle primitives: admission gate and active-work tracking.
//!
//! Shutdown order is driven by `Dispatcher::shutdown`:
//! stop accepting -> wait for active work to drain -> cancel -> join.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::info;

/// Boolean switch deciding whether new submissions are admitted.
///
/// Starts open. Once closed it stays closed.
#[derive(Debug)]
pub struct AdmissionGate {
    accepting: AtomicBool,
    closed: Notify,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            accepting: AtomicBool::new(true),
            closed: Notify::new(),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Idempotent.
    pub fn stop_accepting(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!("stopped accepting new tasks");
            self.closed.notify_waiters();
        }
    }

    /// Resolves once the gate has been closed.
    pub async fn closed(&self) {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        if !self.is_accepting() {
            return;
        }
        closed.await;
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts task bodies currently executing, with a "reached zero" signal.
#[derive(Debug, Default)]
pub struct ActiveWork {
    count: AtomicUsize,
    idle: Notify,
}

impl ActiveWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one execution as started. It ends when the guard drops.
    pub fn begin(&self) -> ActiveGuard<'_> {
        self.count.fetch_add(1, Ordering::AcqRel);
        ActiveGuard { work: self }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until no execution is in progress.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.count() == 0 {
                return;
            }
            idle.await;
        }
    }
}

pub struct ActiveGuard<'a> {
    work: &'a ActiveWork,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if self.work.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.work.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn gate_closes_once_and_stays_closed() {
        let gate = AdmissionGate::new();
        assert!(gate.is_accepting());
        gate.stop_accepting();
        gate.stop_accepting();
        assert!(!gate.is_accepting());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_resolves_when_gate_closes() {
        let gate = Arc::new(AdmissionGate::new());
        let watcher = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.closed().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!watcher.is_finished());

        gate.stop_accepting();
        watcher.await.unwrap();
        // 閉じた後は即座に返る
        gate.closed().await;
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_without_work() {
        let work = ActiveWork::new();
        work.wait_idle().await;
        assert_eq!(work.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_blocks_until_last_guard_drops() {
        let work = Arc::new(ActiveWork::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let busy = tokio::spawn({
            let work = Arc::clone(&work);
            async move {
                let _outer = work.begin();
                let _inner = work.begin();
                let _ = release_rx.await;
            }
        });
        while work.count() < 2 {
            tokio::task::yield_now().await;
        }

        let waiter = tokio::spawn({
            let work = Arc::clone(&work);
            async move { work.wait_idle().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        release_tx.send(()).unwrap();
        busy.await.unwrap();
        waiter.await.unwrap();
        assert_eq!(work.count(), 0);
    }
}
