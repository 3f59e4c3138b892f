//! The task record store: one row per task.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use taskvault_core::{Task, TaskResult, TaskState};

use crate::codec;
use crate::dialect::JsonAdapter;
use crate::session::{SqlSession, SqlValue};
use crate::sql::Statements;

/// Owns the single `tasks` row per task: identity, context reference,
/// status, metadata, finalization marker.
pub(crate) struct TaskRecordStore {
    statements: Arc<Statements>,
    adapter: JsonAdapter,
}

/// One loaded `tasks` row, JSON columns still as trees. The finalization
/// marker is not part of task assembly and keeps its own probe query.
pub(crate) struct TaskRow {
    pub task_id: String,
    pub context_id: String,
    pub status_state: String,
    pub status_message: Option<serde_json::Value>,
    pub status_timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl TaskRecordStore {
    pub fn new(statements: Arc<Statements>, adapter: JsonAdapter) -> Self {
        Self {
            statements,
            adapter,
        }
    }

    /// Upsert the record row.
    ///
    /// UPDATE first; zero rows affected means the task is new, so INSERT;
    /// a unique violation there means another writer inserted concurrently,
    /// so fall back to UPDATE. This avoids a separate existence probe while
    /// staying correct under racing first-writers.
    ///
    /// `finalized_at` is set-once: the first save in a terminal state fixes
    /// it (COALESCE in the UPDATE, the insert value otherwise) and later
    /// saves never move or clear it.
    pub fn save(&self, session: &mut dyn SqlSession, task: &Task) -> TaskResult<()> {
        let status = &task.status;
        let status_message = status
            .message
            .as_ref()
            .map(codec::message_json)
            .transpose()?;
        let state = status.state.as_str();
        let now = Utc::now();
        let finalized_at = if status.state.is_terminal() {
            SqlValue::Timestamp(now)
        } else {
            SqlValue::Null
        };

        let updated = session.execute(
            &self.statements.update_task,
            &[
                SqlValue::Text(task.context_id.clone()),
                SqlValue::Text(state.to_string()),
                self.adapter.adapt(status_message.clone())?,
                SqlValue::Timestamp(status.timestamp),
                finalized_at.clone(),
                SqlValue::Timestamp(now),
                SqlValue::Text(task.id.clone()),
            ],
        )?;
        if updated > 0 {
            return Ok(());
        }

        let insert_params = [
            SqlValue::Text(task.id.clone()),
            SqlValue::Text(task.context_id.clone()),
            SqlValue::Text(state.to_string()),
            self.adapter.adapt(status_message.clone())?,
            SqlValue::Timestamp(status.timestamp),
            finalized_at.clone(),
            SqlValue::Timestamp(now),
            SqlValue::Timestamp(now),
        ];
        match session.execute(&self.statements.insert_task, &insert_params) {
            Ok(_) => Ok(()),
            Err(e) if e.is_unique_violation() => {
                // Lost the insert race; the row exists now, so update it.
                tracing::debug!(task_id = %task.id, "record insert raced, retrying as update");
                session.execute(
                    &self.statements.update_task,
                    &[
                        SqlValue::Text(task.context_id.clone()),
                        SqlValue::Text(state.to_string()),
                        self.adapter.adapt(status_message)?,
                        SqlValue::Timestamp(status.timestamp),
                        finalized_at,
                        SqlValue::Timestamp(now),
                        SqlValue::Text(task.id.clone()),
                    ],
                )?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Point lookup; `None` when no row matches.
    pub fn find_by_id(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
    ) -> TaskResult<Option<TaskRow>> {
        let rows = session.query(
            &self.statements.select_task,
            &[SqlValue::Text(task_id.to_string())],
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };

        Ok(Some(TaskRow {
            task_id: row.text(0)?.to_string(),
            context_id: row.text(1)?.to_string(),
            status_state: row.text(2)?.to_string(),
            status_message: row.opt_json(3)?,
            status_timestamp: row.timestamp(4)?,
            metadata: row.opt_json(5)?,
        }))
    }

    /// Replace the metadata column; empty metadata persists as NULL.
    pub fn update_metadata(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
        metadata: &std::collections::HashMap<String, serde_json::Value>,
    ) -> TaskResult<()> {
        let metadata_json = codec::metadata_json(metadata)?;
        session.execute(
            &self.statements.update_task_metadata,
            &[
                self.adapter.adapt(metadata_json)?,
                SqlValue::Timestamp(Utc::now()),
                SqlValue::Text(task_id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Remove the record row. History and artifact rows go with it via the
    /// schema-level cascade; this store does not delete them itself.
    pub fn delete(&self, session: &mut dyn SqlSession, task_id: &str) -> TaskResult<()> {
        session.execute(
            &self.statements.delete_task,
            &[SqlValue::Text(task_id.to_string())],
        )?;
        Ok(())
    }

    /// True iff the row exists and its state is outside the terminal set.
    pub fn is_active(&self, session: &mut dyn SqlSession, task_id: &str) -> TaskResult<bool> {
        let rows = session.query(
            &self.statements.select_status_state,
            &[SqlValue::Text(task_id.to_string())],
        )?;
        match rows.first() {
            Some(row) => Ok(!TaskState::parse(row.text(0)?).is_terminal()),
            None => Ok(false),
        }
    }

    /// True iff the row exists and carries a finalization marker.
    pub fn is_finalized(&self, session: &mut dyn SqlSession, task_id: &str) -> TaskResult<bool> {
        let rows = session.query(
            &self.statements.select_finalized_at,
            &[SqlValue::Text(task_id.to_string())],
        )?;
        match rows.first() {
            Some(row) => Ok(row.opt_timestamp(0)?.is_some()),
            None => Ok(false),
        }
    }
}
