//! SQL statement text, rendered once per store.
//!
//! Table names take an explicit prefix from configuration, threaded through
//! this constructor; there is no process-global naming state. Placeholders
//! are positional `?`; the PostgreSQL session rewrites them to `$n`.

/// The statement set for one store instance.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub tasks_table: String,
    pub history_table: String,
    pub artifacts_table: String,

    pub update_task: String,
    pub insert_task: String,
    pub select_task: String,
    pub update_task_metadata: String,
    pub delete_task: String,
    pub select_status_state: String,
    pub select_finalized_at: String,

    pub delete_history: String,
    pub count_history: String,
    pub insert_history_prefix: String,
    pub select_history: String,

    pub delete_artifacts: String,
    pub insert_artifacts_prefix: String,
    pub select_artifacts: String,
}

/// Columns per history insert row
pub(crate) const HISTORY_INSERT_COLUMNS: usize = 6;

/// Columns per artifact insert row
pub(crate) const ARTIFACT_INSERT_COLUMNS: usize = 8;

impl Statements {
    pub fn new(table_prefix: &str) -> Self {
        let tasks = format!("{table_prefix}tasks");
        let history = format!("{table_prefix}history");
        let artifacts = format!("{table_prefix}artifacts");

        Self {
            update_task: format!(
                "UPDATE {tasks} SET context_id = ?, status_state = ?, \
                 status_message_json = ?, status_timestamp = ?, \
                 finalized_at = COALESCE(finalized_at, ?), updated_at = ? \
                 WHERE task_id = ?"
            ),
            insert_task: format!(
                "INSERT INTO {tasks} (task_id, context_id, status_state, \
                 status_message_json, status_timestamp, finalized_at, \
                 created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            select_task: format!(
                "SELECT task_id, context_id, status_state, status_message_json, \
                 status_timestamp, metadata_json \
                 FROM {tasks} WHERE task_id = ?"
            ),
            update_task_metadata: format!(
                "UPDATE {tasks} SET metadata_json = ?, updated_at = ? WHERE task_id = ?"
            ),
            delete_task: format!("DELETE FROM {tasks} WHERE task_id = ?"),
            select_status_state: format!(
                "SELECT status_state FROM {tasks} WHERE task_id = ?"
            ),
            select_finalized_at: format!(
                "SELECT finalized_at FROM {tasks} WHERE task_id = ?"
            ),

            delete_history: format!("DELETE FROM {history} WHERE task_id = ?"),
            count_history: format!("SELECT COUNT(*) FROM {history} WHERE task_id = ?"),
            insert_history_prefix: format!(
                "INSERT INTO {history} (task_id, message_id, role, content_json, \
                 metadata_json, sequence_num) VALUES "
            ),
            select_history: format!(
                "SELECT message_id, role, content_json, metadata_json \
                 FROM {history} WHERE task_id = ? ORDER BY sequence_num"
            ),

            delete_artifacts: format!("DELETE FROM {artifacts} WHERE task_id = ?"),
            insert_artifacts_prefix: format!(
                "INSERT INTO {artifacts} (task_id, artifact_id, name, description, \
                 content_json, metadata_json, extensions_json, sequence_num) VALUES "
            ),
            select_artifacts: format!(
                "SELECT artifact_id, name, description, content_json, \
                 metadata_json, extensions_json \
                 FROM {artifacts} WHERE task_id = ? ORDER BY sequence_num"
            ),

            tasks_table: tasks,
            history_table: history,
            artifacts_table: artifacts,
        }
    }
}

/// Placeholder groups for a chunked multi-row insert:
/// `(?, ?, ...), (?, ?, ...)`.
pub(crate) fn multi_row_placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_applied_to_every_table() {
        let sql = Statements::new("agent_");
        assert_eq!(sql.tasks_table, "agent_tasks");
        assert_eq!(sql.history_table, "agent_history");
        assert_eq!(sql.artifacts_table, "agent_artifacts");
        assert!(sql.update_task.contains("UPDATE agent_tasks"));
        assert!(sql.count_history.contains("FROM agent_history"));
        assert!(sql.delete_artifacts.contains("FROM agent_artifacts"));
    }

    #[test]
    fn empty_prefix_uses_bare_names() {
        let sql = Statements::new("");
        assert!(sql.select_task.contains("FROM tasks"));
        assert!(sql.select_history.contains("FROM history"));
    }

    #[test]
    fn update_preserves_first_finalization() {
        let sql = Statements::new("");
        assert!(
            sql.update_task
                .contains("finalized_at = COALESCE(finalized_at, ?)")
        );
    }

    #[test]
    fn multi_row_placeholder_layout() {
        assert_eq!(multi_row_placeholders(1, 2), "(?, ?)");
        assert_eq!(multi_row_placeholders(2, 3), "(?, ?, ?), (?, ?, ?)");
    }
}
