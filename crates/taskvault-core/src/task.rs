//! Task and task-status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{Artifact, Message};

/// A long-running unit of agent work, as persisted by a task store.
///
/// A task carries its lifecycle status, the ordered history of messages
/// exchanged while working on it, the artifacts produced so far, and
/// free-form metadata. The task id is the persistence key; history order is
/// append order and is preserved on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier for the task
    pub id: String,

    /// Context the task belongs to; defaults to the task id
    pub context_id: String,

    /// Current status of the task
    pub status: TaskStatus,

    /// Ordered message history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,

    /// Artifacts produced by the task
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Create a new task with the given id. The context id defaults to the
    /// task id until overridden.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            context_id: id.clone(),
            id,
            status: TaskStatus::new(TaskState::Submitted),
            history: Vec::new(),
            artifacts: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create a new task with a generated UUID
    pub fn new_with_uuid() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Set the context id
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = context_id.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Append a message to the history
    pub fn with_message(mut self, message: Message) -> Self {
        self.history.push(message);
        self
    }

    /// Add an artifact
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Set a metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }
}

/// Status of a task: state, optional status message, and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Lifecycle state
    pub state: TaskState,

    /// Optional message describing the status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// When the status was set
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    /// Create a status for the given state, stamped now
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a status message
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Task lifecycle state.
///
/// The wire form is the lowercase-hyphenated string (`"input-required"`,
/// `"auth-required"`, ...) and is what gets persisted; it must not change,
/// or previously stored rows become unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Task has been submitted and not yet picked up
    Submitted,

    /// Task is actively being processed
    Working,

    /// Task requires additional input to proceed
    InputRequired,

    /// Task requires authentication to proceed
    AuthRequired,

    /// Task completed successfully
    Completed,

    /// Task was canceled
    Canceled,

    /// Task failed
    Failed,

    /// Task was rejected
    Rejected,

    /// State stored by a newer writer that this reader does not recognize
    Unknown,
}

impl TaskState {
    /// Check if this state is terminal: no further transition occurs, and a
    /// task saved in it acquires its finalization marker.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Canceled | TaskState::Failed | TaskState::Rejected
        )
    }

    /// The persisted wire string for this state
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::AuthRequired => "auth-required",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
            TaskState::Unknown => "unknown",
        }
    }

    /// Parse a persisted wire string. Unrecognized values map to
    /// [`TaskState::Unknown`] so rows written by newer versions stay
    /// readable.
    pub fn parse(value: &str) -> Self {
        match value {
            "submitted" => TaskState::Submitted,
            "working" => TaskState::Working,
            "input-required" => TaskState::InputRequired,
            "auth-required" => TaskState::AuthRequired,
            "completed" => TaskState::Completed,
            "canceled" => TaskState::Canceled,
            "failed" => TaskState::Failed,
            "rejected" => TaskState::Rejected,
            _ => TaskState::Unknown,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_set_is_exactly_the_four_final_states() {
        let terminal = [
            TaskState::Completed,
            TaskState::Canceled,
            TaskState::Failed,
            TaskState::Rejected,
        ];
        for state in terminal {
            assert!(state.is_terminal(), "{state} should be terminal");
        }
        for state in [
            TaskState::Submitted,
            TaskState::Working,
            TaskState::InputRequired,
            TaskState::AuthRequired,
            TaskState::Unknown,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }

    #[test]
    fn state_wire_strings_round_trip() {
        for state in [
            TaskState::Submitted,
            TaskState::Working,
            TaskState::InputRequired,
            TaskState::AuthRequired,
            TaskState::Completed,
            TaskState::Canceled,
            TaskState::Failed,
            TaskState::Rejected,
            TaskState::Unknown,
        ] {
            assert_eq!(TaskState::parse(state.as_str()), state);
        }
    }

    #[test]
    fn unrecognized_state_parses_to_unknown() {
        assert_eq!(TaskState::parse("paused"), TaskState::Unknown);
        assert_eq!(TaskState::parse(""), TaskState::Unknown);
    }

    #[test]
    fn context_id_defaults_to_task_id() {
        let task = Task::new("t-1");
        assert_eq!(task.context_id, "t-1");

        let task = Task::new("t-1").with_context_id("ctx-9");
        assert_eq!(task.context_id, "ctx-9");
    }

    #[test]
    fn serde_uses_kebab_case_states() {
        let json = serde_json::to_value(TaskState::InputRequired).unwrap();
        assert_eq!(json, serde_json::json!("input-required"));
        let json = serde_json::to_value(TaskState::AuthRequired).unwrap();
        assert_eq!(json, serde_json::json!("auth-required"));
    }
}
