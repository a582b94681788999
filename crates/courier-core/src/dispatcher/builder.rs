//! DispatcherBuilder - 構築とワイヤリング
//!
//! build() 時に handler の未設定を検出する（Fail-fast）。

use std::sync::Arc;

use crate::config::DispatcherConfig;
use crate::retry::RetryPolicy;
use crate::runtime::TaskHandler;
use crate::store::{InMemoryTaskStore, TaskStore};

use super::Dispatcher;

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task handler registered; call `handler()` before `build()`")]
    MissingHandler,
}

/// Builds a [`Dispatcher`].
///
/// # 使用例
/// ```ignore
/// let dispatcher = Dispatcher::builder()
///     .config(DispatcherConfig::from_env())
///     .handler(SimulatedHandler::default())
///     .build()?;
/// dispatcher.start();
/// ```
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    store: Option<Arc<dyn TaskStore>>,
    handler: Option<Arc<dyn TaskHandler>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Share an existing store. Defaults to a fresh [`InMemoryTaskStore`].
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn handler(self, handler: impl TaskHandler + 'static) -> Self {
        self.shared_handler(Arc::new(handler))
    }

    pub fn shared_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let handler = self.handler.ok_or(BuildError::MissingHandler)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        Ok(Dispatcher::new(self.config, store, handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskState};
    use crate::runtime::SimulatedHandler;

    #[test]
    fn build_without_handler_fails() {
        let result = DispatcherBuilder::new().build();
        assert!(matches!(result, Err(BuildError::MissingHandler)));
    }

    #[test]
    fn build_applies_overrides() {
        let dispatcher = DispatcherBuilder::new()
            .config(DispatcherConfig::default())
            .workers(2)
            .queue_capacity(5)
            .handler(SimulatedHandler::default())
            .build()
            .unwrap();

        assert_eq!(dispatcher.config().workers, 2);
        assert_eq!(dispatcher.config().queue_capacity, 5);
        assert!(dispatcher.is_accepting());
    }

    #[test]
    fn shared_store_is_used() {
        let store = Arc::new(InMemoryTaskStore::new());
        let dispatcher = DispatcherBuilder::new()
            .store(store.clone())
            .handler(SimulatedHandler::default())
            .build()
            .unwrap();

        dispatcher
            .store()
            .create_or_update(Task::new("seen", "", 0), TaskState::Queued);
        assert_eq!(store.len(), 1);
    }
}
