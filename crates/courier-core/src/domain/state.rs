//! Task lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the latest lineage of a task id.
///
/// State transitions:
/// - Queued -> Running -> Done
/// - Queued -> Running -> Queued (retry pending) -> Running -> ...
/// - Queued -> Running -> Failed (retries exhausted, or retry abandoned on shutdown)
///
/// `Queued` after a failure means "will be retried", not "is in the queue right now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
}

impl TaskState {
    /// Is this a terminal state for the current lineage?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::queued(TaskState::Queued, false)]
    #[case::running(TaskState::Running, false)]
    #[case::done(TaskState::Done, true)]
    #[case::failed(TaskState::Failed, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }

    #[test]
    fn serializes_as_lowercase_string() {
        let json = serde_json::to_string(&TaskState::Running).unwrap();
        assert_eq!(json, r#""running""#);
        assert_eq!(TaskState::Failed.to_string(), "failed");
    }
}
