//! Canonical DDL for the fixed relational schema.
//!
//! The schema is fixed and normally provisioned by the host deployment;
//! these statements exist for embedded SQLite use and test setup. This is
//! not a migration engine — there is exactly one schema version.
//!
//! Deleting a `tasks` row cascades to its `history` and `artifacts` rows;
//! the store's `delete` relies on that and removes only the task row
//! itself.

use crate::dialect::Dialect;

/// Render the `CREATE TABLE IF NOT EXISTS` statements for the dialect,
/// with the configured table prefix applied.
pub(crate) fn ddl(dialect: Dialect, table_prefix: &str) -> Vec<String> {
    let tasks = format!("{table_prefix}tasks");
    let history = format!("{table_prefix}history");
    let artifacts = format!("{table_prefix}artifacts");

    let (json_type, timestamp_type) = match dialect {
        Dialect::Sqlite => ("TEXT", "TEXT"),
        Dialect::Postgres => ("JSONB", "TIMESTAMPTZ"),
    };

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {tasks} (\n\
             \x20   task_id TEXT PRIMARY KEY,\n\
             \x20   context_id TEXT NOT NULL,\n\
             \x20   status_state TEXT NOT NULL,\n\
             \x20   status_message_json {json_type},\n\
             \x20   status_timestamp {timestamp_type} NOT NULL,\n\
             \x20   metadata_json {json_type},\n\
             \x20   finalized_at {timestamp_type},\n\
             \x20   created_at {timestamp_type} NOT NULL,\n\
             \x20   updated_at {timestamp_type} NOT NULL\n\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {history} (\n\
             \x20   task_id TEXT NOT NULL REFERENCES {tasks}(task_id) ON DELETE CASCADE,\n\
             \x20   message_id TEXT NOT NULL,\n\
             \x20   role TEXT NOT NULL,\n\
             \x20   content_json {json_type} NOT NULL,\n\
             \x20   metadata_json {json_type},\n\
             \x20   sequence_num BIGINT NOT NULL,\n\
             \x20   UNIQUE (task_id, sequence_num)\n\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {artifacts} (\n\
             \x20   task_id TEXT NOT NULL REFERENCES {tasks}(task_id) ON DELETE CASCADE,\n\
             \x20   artifact_id TEXT NOT NULL,\n\
             \x20   name TEXT,\n\
             \x20   description TEXT,\n\
             \x20   content_json {json_type} NOT NULL,\n\
             \x20   metadata_json {json_type},\n\
             \x20   extensions_json {json_type},\n\
             \x20   sequence_num BIGINT NOT NULL,\n\
             \x20   UNIQUE (task_id, sequence_num)\n\
             )"
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_ddl_is_text_affine() {
        let statements = ddl(Dialect::Sqlite, "");
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("status_message_json TEXT"));
        assert!(statements[0].contains("status_timestamp TEXT NOT NULL"));
    }

    #[test]
    fn postgres_ddl_uses_native_types() {
        let statements = ddl(Dialect::Postgres, "a2a_");
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS a2a_tasks"));
        assert!(statements[0].contains("status_message_json JSONB"));
        assert!(statements[1].contains("REFERENCES a2a_tasks(task_id) ON DELETE CASCADE"));
    }

    #[test]
    fn child_tables_cascade_and_deduplicate_sequences() {
        for statement in ddl(Dialect::Sqlite, "") {
            if statement.contains("history") || statement.contains("artifacts") {
                assert!(statement.contains("ON DELETE CASCADE"));
                assert!(statement.contains("UNIQUE (task_id, sequence_num)"));
            }
        }
    }
}
