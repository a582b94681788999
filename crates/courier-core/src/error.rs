use thiserror::Error;

use crate::domain::TaskId;

/// Why a submission was not admitted.
///
/// Every variant is recoverable by the caller (retry later or report upstream).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("service not accepting new tasks")]
    NotAccepting,

    #[error("queue is full")]
    QueueFull,

    #[error("invalid task: {0}")]
    InvalidTask(String),
}

/// Failure reported by a task handler.
///
/// Never propagated out of the dispatcher; it only drives the retry decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task_id} failed: {message}")]
pub struct HandlerError {
    pub task_id: TaskId,
    pub message: String,
}

impl HandlerError {
    pub fn new(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            task_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {name}={value}: expected a non-negative integer")]
    InvalidNumber { name: String, value: String },

    #[error("{name} must be positive")]
    NotPositive { name: String },
}
