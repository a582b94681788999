//! Per-id mutable metadata kept by the task store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Task, TaskState};

/// Metadata + last submitted task for one task id.
///
/// Only the store mutates this. Everyone else gets an owned snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task: Task,

    /// Failed executions in the current lineage.
    pub attempts: u32,

    pub state: TaskState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskMeta {
    pub fn new(task: Task, state: TaskState) -> Self {
        let now = Utc::now();
        Self {
            task,
            attempts: 0,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a fresh lineage for the same id.
    pub fn resubmit(&mut self, task: Task, state: TaskState) {
        self.task = task;
        self.state = state;
        self.attempts = 0;
        self.updated_at = Utc::now();
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Record one more failed execution and return the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = Utc::now();
        self.attempts
    }
}
