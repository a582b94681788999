use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-chosen task identity.
///
/// 同じ id の再投入は新しい lineage として扱う（attempts はリセット）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A unit of work as submitted by a client.
///
/// Immutable once submitted: a retry re-enters the queue with the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub payload: String,
    /// Inclusive cap on retries after the first failed execution.
    #[serde(default)]
    pub max_retries: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, payload: impl Into<String>, max_retries: u32) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_deserializes_from_submission_body() {
        let task: Task =
            serde_json::from_str(r#"{"id":"task1","payload":"data","max_retries":1}"#).unwrap();
        assert_eq!(task, Task::new("task1", "data", 1));
    }

    #[test]
    fn payload_and_retries_default_when_missing() {
        let task: Task = serde_json::from_str(r#"{"id":"bare"}"#).unwrap();
        assert_eq!(task.payload, "");
        assert_eq!(task.max_retries, 0);
    }

    #[test]
    fn negative_retries_are_rejected_at_decode() {
        let res: Result<Task, _> = serde_json::from_str(r#"{"id":"t","max_retries":-1}"#);
        assert!(res.is_err());
    }
}
