//! The append-only history store.

use std::sync::Arc;

use taskvault_core::{Message, Role, TaskResult, TaskStoreError};

use crate::codec;
use crate::dialect::JsonAdapter;
use crate::session::{SqlSession, SqlValue};
use crate::sql::{HISTORY_INSERT_COLUMNS, Statements, multi_row_placeholders};

/// Owns the ordered message log per task.
///
/// Rows are created once and never mutated; saves append only the suffix
/// beyond what is already persisted. Callers pass the full history,
/// previously seen prefix included, which keeps appends O(new messages).
pub(crate) struct HistoryStore {
    statements: Arc<Statements>,
    adapter: JsonAdapter,
    batch_size: usize,
}

impl HistoryStore {
    pub fn new(statements: Arc<Statements>, adapter: JsonAdapter, batch_size: usize) -> Self {
        Self {
            statements,
            adapter,
            batch_size: batch_size.max(1),
        }
    }

    /// Persist the history for a task.
    ///
    /// Empty input clears all rows. Otherwise, existing rows are
    /// authoritative: only messages beyond the current count are inserted,
    /// at continuing sequence numbers; a same-length or shorter input is a
    /// no-op.
    pub fn save_all(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
        messages: &[Message],
    ) -> TaskResult<()> {
        if messages.is_empty() {
            session.execute(
                &self.statements.delete_history,
                &[SqlValue::Text(task_id.to_string())],
            )?;
            return Ok(());
        }

        let existing = self.count(session, task_id)?;
        if existing == 0 {
            self.insert_from(session, task_id, messages, 0)?;
        } else if messages.len() > existing {
            self.insert_from(session, task_id, &messages[existing..], existing)?;
        }
        Ok(())
    }

    fn count(&self, session: &mut dyn SqlSession, task_id: &str) -> TaskResult<usize> {
        let rows = session.query(
            &self.statements.count_history,
            &[SqlValue::Text(task_id.to_string())],
        )?;
        let count = rows.first().map(|row| row.int(0)).transpose()?.unwrap_or(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn insert_from(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
        messages: &[Message],
        start_sequence: usize,
    ) -> TaskResult<()> {
        for (chunk_index, chunk) in messages.chunks(self.batch_size).enumerate() {
            let sql = format!(
                "{}{}",
                self.statements.insert_history_prefix,
                multi_row_placeholders(chunk.len(), HISTORY_INSERT_COLUMNS)
            );

            let mut params = Vec::with_capacity(chunk.len() * HISTORY_INSERT_COLUMNS);
            for (offset, message) in chunk.iter().enumerate() {
                let sequence = start_sequence + chunk_index * self.batch_size + offset;
                let message_id = message
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{task_id}-msg-{sequence}"));

                params.push(SqlValue::Text(task_id.to_string()));
                params.push(SqlValue::Text(message_id));
                params.push(SqlValue::Text(message.role.as_str().to_string()));
                params.push(self.adapter.adapt(Some(codec::parts_json(&message.parts)?))?);
                params.push(self.adapter.adapt(codec::metadata_json(&message.metadata)?)?);
                params.push(SqlValue::Int(sequence as i64));
            }

            session.execute(&sql, &params)?;
        }

        tracing::debug!(
            task_id,
            appended = messages.len(),
            start_sequence,
            "appended history rows"
        );
        Ok(())
    }

    /// Load the history in sequence order.
    pub fn find_by_task_id(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
    ) -> TaskResult<Vec<Message>> {
        let rows = session.query(
            &self.statements.select_history,
            &[SqlValue::Text(task_id.to_string())],
        )?;

        rows.iter()
            .map(|row| {
                let message_id = row.text(0)?.to_string();
                let role = row.text(1)?;
                let role = Role::parse(role).ok_or_else(|| {
                    TaskStoreError::deserialization(
                        "history role",
                        format!("unrecognized role {role:?}"),
                    )
                })?;

                let content = row.opt_json(2)?.ok_or_else(|| {
                    TaskStoreError::deserialization("history content", "content_json is null")
                })?;
                let content = codec::recover_tree(content, "history content");
                let parts = codec::decode_parts(&content, "history content")?;

                let metadata = codec::metadata_from_tree(row.opt_json(3)?, "history metadata")?;

                Ok(Message {
                    id: Some(message_id),
                    role,
                    parts,
                    metadata,
                    context_id: Some(task_id.to_string()),
                    task_id: Some(task_id.to_string()),
                })
            })
            .collect()
    }
}
