//! Task store: task id -> `TaskMeta`.
//!
//! The store is the only shared mutable state of the dispatcher. Workers and the
//! retry scheduler go through these operations and never touch a `TaskMeta`
//! directly. Unknown ids are silent no-ops, not errors.

mod memory;

pub use memory::InMemoryTaskStore;

use std::collections::HashMap;

use crate::domain::{Task, TaskId, TaskMeta, TaskState};
use crate::observability::StateCounts;

/// Store port.
///
/// 同期 API（I/O なし）。呼び出し側はロックを跨いで await しない。
pub trait TaskStore: Send + Sync {
    /// Insert a fresh record, or start a new lineage for a known id
    /// (task overwritten, attempts reset to 0).
    fn create_or_update(&self, task: Task, state: TaskState);

    fn set_state(&self, id: &TaskId, state: TaskState);

    /// Linearizable increment; returns the new count, or 0 for an unknown id.
    fn increment_attempts(&self, id: &TaskId) -> u32;

    fn get(&self, id: &TaskId) -> Option<TaskMeta>;

    fn dump_all(&self) -> HashMap<TaskId, TaskMeta>;

    fn counts_by_state(&self) -> StateCounts {
        StateCounts::from_metas(self.dump_all().values())
    }
}
