//! courier-core
//!
//! In-process task dispatcher: a bounded queue feeding a fixed pool of workers,
//! exponential-backoff retries, and a drain-then-cancel shutdown.
//!
//! # モジュール構成
//! - **domain**: `Task`, `TaskId`, `TaskState`, `TaskMeta`
//! - **store**: `TaskStore` port + `InMemoryTaskStore`
//! - **queue**: `BoundedQueue`（非ブロッキング投入、ブロッキング取り出し）
//! - **retry**: `RetryPolicy`（backoff + jitter）と `RetryScheduler`（遅延再投入）
//! - **lifecycle**: `AdmissionGate`, `ActiveWork`
//! - **runtime**: `TaskHandler` trait と `SimulatedHandler`
//! - **dispatcher**: 上記を組み合わせた `Dispatcher` と `DispatcherBuilder`
//! - **config** / **observability** / **error**
//!
//! State lives only in process memory and is lost on restart.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod queue;
pub mod retry;
pub mod runtime;
pub mod store;

mod worker;

pub use config::DispatcherConfig;
pub use dispatcher::{BuildError, Dispatcher, DispatcherBuilder};
pub use domain::{Task, TaskId, TaskMeta, TaskState};
pub use error::{ConfigError, EnqueueError, HandlerError};
pub use observability::StateCounts;
pub use runtime::{SimulatedHandler, TaskHandler};
