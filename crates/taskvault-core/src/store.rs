//! The task store contract and the transient in-memory implementation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{TaskResult, TaskStoreError};
use crate::message::Message;
use crate::task::Task;

/// Durable storage for task state.
///
/// This is the single contract consumers program against. `save` persists
/// the whole task (status, history, artifacts, metadata); history is
/// append-only across saves, artifacts are replaced wholesale, and a task
/// first saved in a terminal state acquires an immutable finalization
/// marker.
pub trait TaskStore: Send + Sync {
    /// Persist the task. Fails with `InvalidArgument` when the id is blank.
    fn save(&self, task: &Task) -> TaskResult<()>;

    /// Load a task by id, or `None` when no task exists under that id.
    fn get(&self, task_id: &str) -> TaskResult<Option<Task>>;

    /// Remove a task and everything stored under it.
    fn delete(&self, task_id: &str) -> TaskResult<()>;

    /// True iff the task exists and its state is not terminal.
    fn is_active(&self, task_id: &str) -> TaskResult<bool>;

    /// True iff the task exists and has been saved in a terminal state.
    fn is_finalized(&self, task_id: &str) -> TaskResult<bool>;
}

/// Reject blank task ids up front; every operation shares this rule.
pub fn require_task_id(task_id: &str) -> TaskResult<()> {
    if task_id.trim().is_empty() {
        return Err(TaskStoreError::invalid_argument(
            "task id must not be blank",
        ));
    }
    Ok(())
}

struct StoredTask {
    task: Task,
    finalized_at: Option<DateTime<Utc>>,
}

/// Transient task store backed by a `HashMap`.
///
/// Suitable for development and tests; all data is lost when the process
/// exits. Observable semantics match the relational store: append-only
/// history, snapshot-replaced artifacts, set-once finalization.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, StoredTask>>>,
}

impl InMemoryTaskStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored tasks
    pub fn len(&self) -> usize {
        self.tasks.read().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// True when no tasks are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error(operation: &str) -> TaskStoreError {
        TaskStoreError::storage(
            operation,
            "task map lock poisoned",
            crate::error::StorageErrorKind::Statement,
        )
    }

    /// Assign row identity the way the relational store does: a generated
    /// id for messages that carry none, and back-references to the task.
    fn materialize(task_id: &str, mut message: Message, sequence: usize) -> Message {
        if message.id.is_none() {
            message.id = Some(format!("{task_id}-msg-{sequence}"));
        }
        message.context_id = Some(task_id.to_string());
        message.task_id = Some(task_id.to_string());
        message
    }

    fn merge_history(task_id: &str, existing: &[Message], incoming: &[Message]) -> Vec<Message> {
        if incoming.is_empty() {
            return Vec::new();
        }
        if incoming.len() <= existing.len() {
            // Existing rows are authoritative; never rewritten or truncated.
            return existing.to_vec();
        }
        let mut merged = existing.to_vec();
        for (offset, message) in incoming[existing.len()..].iter().enumerate() {
            let sequence = existing.len() + offset;
            merged.push(Self::materialize(task_id, message.clone(), sequence));
        }
        merged
    }
}

impl TaskStore for InMemoryTaskStore {
    fn save(&self, task: &Task) -> TaskResult<()> {
        require_task_id(&task.id)?;

        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| Self::lock_error("save"))?;

        let now = Utc::now();
        let terminal = task.status.state.is_terminal();

        match tasks.get_mut(&task.id) {
            Some(stored) => {
                let history =
                    Self::merge_history(&task.id, &stored.task.history, &task.history);
                stored.task = task.clone();
                stored.task.history = history;
                if terminal && stored.finalized_at.is_none() {
                    stored.finalized_at = Some(now);
                }
            }
            None => {
                let mut fresh = task.clone();
                fresh.history = task
                    .history
                    .iter()
                    .enumerate()
                    .map(|(sequence, message)| {
                        Self::materialize(&task.id, message.clone(), sequence)
                    })
                    .collect();
                tasks.insert(
                    task.id.clone(),
                    StoredTask {
                        task: fresh,
                        finalized_at: terminal.then_some(now),
                    },
                );
            }
        }

        tracing::debug!(task_id = %task.id, state = %task.status.state, "saved task");
        Ok(())
    }

    fn get(&self, task_id: &str) -> TaskResult<Option<Task>> {
        require_task_id(task_id)?;
        let tasks = self.tasks.read().map_err(|_| Self::lock_error("get"))?;
        Ok(tasks.get(task_id).map(|stored| stored.task.clone()))
    }

    fn delete(&self, task_id: &str) -> TaskResult<()> {
        require_task_id(task_id)?;
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| Self::lock_error("delete"))?;
        tasks.remove(task_id);
        Ok(())
    }

    fn is_active(&self, task_id: &str) -> TaskResult<bool> {
        require_task_id(task_id)?;
        let tasks = self
            .tasks
            .read()
            .map_err(|_| Self::lock_error("is_active"))?;
        Ok(tasks
            .get(task_id)
            .is_some_and(|stored| !stored.task.status.state.is_terminal()))
    }

    fn is_finalized(&self, task_id: &str) -> TaskResult<bool> {
        require_task_id(task_id)?;
        let tasks = self
            .tasks
            .read()
            .map_err(|_| Self::lock_error("is_finalized"))?;
        Ok(tasks
            .get(task_id)
            .is_some_and(|stored| stored.finalized_at.is_some()))
    }
}
