use serde::{Deserialize, Serialize};

use crate::domain::{TaskMeta, TaskState};

/// Number of known task ids per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl StateCounts {
    pub fn from_metas<'a>(metas: impl IntoIterator<Item = &'a TaskMeta>) -> Self {
        let mut counts = Self::default();
        for meta in metas {
            match meta.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Done => counts.done += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.done + self.failed
    }

    /// No task is waiting or executing.
    pub fn is_settled(&self) -> bool {
        self.queued == 0 && self.running == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;

    #[test]
    fn counts_each_state() {
        let mut done = TaskMeta::new(Task::new("a", "", 0), TaskState::Queued);
        done.set_state(TaskState::Done);
        let queued = TaskMeta::new(Task::new("b", "", 0), TaskState::Queued);
        let failed = TaskMeta::new(Task::new("c", "", 0), TaskState::Failed);

        let counts = StateCounts::from_metas([&done, &queued, &failed]);
        assert_eq!(counts.done, 1);
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 3);
        assert!(!counts.is_settled());
    }
}
