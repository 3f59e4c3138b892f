//! Integration tests for the SQLite-backed task store.
//!
//! These run the full stack — facade, transactions, row stores, codec,
//! cache — against a temp-file database, and verify row-level effects
//! through a separate raw connection where the contract is about what is
//! actually persisted.

use serde_json::json;
use tempfile::TempDir;

use taskvault_store::{
    Artifact, CacheSettings, Message, Part, SqlTaskStore, Task, TaskState, TaskStatus, TaskStore,
    TaskStoreConfig, TaskStoreError,
};

fn open_store(dir: &TempDir, config: TaskStoreConfig) -> (SqlTaskStore, String) {
    let path = dir
        .path()
        .join("tasks.db")
        .to_str()
        .expect("utf-8 temp path")
        .to_string();
    let store = SqlTaskStore::connect(&path, config).unwrap();
    store.ensure_schema().unwrap();
    (store, path)
}

fn default_store(dir: &TempDir) -> (SqlTaskStore, String) {
    open_store(dir, TaskStoreConfig::default())
}

fn raw(path: &str) -> rusqlite::Connection {
    rusqlite::Connection::open(path).unwrap()
}

#[test]
fn full_task_round_trips() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    let status_message = Message::agent("wrapping up").with_id("status-msg");
    let task = Task::new("t1")
        .with_context_id("ctx-7")
        .with_status(TaskStatus::new(TaskState::Working).with_message(status_message.clone()))
        .with_message(Message::user("hi").with_id("m-0"))
        .with_message(
            Message::agent("hello")
                .with_id("m-1")
                .with_metadata("model", json!("small")),
        )
        .with_artifact(
            Artifact::text("a-0", "result text")
                .with_name("summary")
                .with_description("the summary")
                .with_extension("ext.example/v1"),
        )
        .with_metadata("priority", json!(3))
        .with_metadata("labels", json!(["alpha", "beta"]));

    store.save(&task).unwrap();
    let loaded = store.get("t1").unwrap().unwrap();

    assert_eq!(loaded.id, "t1");
    assert_eq!(loaded.context_id, "ctx-7");
    assert_eq!(loaded.status.state, TaskState::Working);
    assert_eq!(loaded.status.message, Some(status_message));
    assert_eq!(loaded.status.timestamp, task.status.timestamp);

    assert_eq!(loaded.history.len(), 2);
    assert_eq!(loaded.history[0].id.as_deref(), Some("m-0"));
    assert_eq!(loaded.history[0].parts[0].as_text(), Some("hi"));
    assert_eq!(loaded.history[1].metadata.get("model"), Some(&json!("small")));
    // Reads attach the owning task to each message.
    assert_eq!(loaded.history[0].task_id.as_deref(), Some("t1"));

    assert_eq!(loaded.artifacts.len(), 1);
    assert_eq!(loaded.artifacts[0].name.as_deref(), Some("summary"));
    assert_eq!(loaded.artifacts[0].extensions, vec!["ext.example/v1"]);

    assert_eq!(loaded.metadata.get("priority"), Some(&json!(3)));
    assert_eq!(loaded.metadata.get("labels"), Some(&json!(["alpha", "beta"])));
}

#[test]
fn lifecycle_scenario_working_then_completed() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    let first = Task::new("t1")
        .with_status(TaskStatus::new(TaskState::Working))
        .with_message(Message::user("hi").with_id("m-0"));
    store.save(&first).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.history.len(), 1);
    assert!(store.is_active("t1").unwrap());
    assert!(!store.is_finalized("t1").unwrap());

    let second = Task::new("t1")
        .with_status(TaskStatus::new(TaskState::Completed))
        .with_message(Message::user("hi").with_id("m-0"))
        .with_message(Message::agent("bye").with_id("m-1"));
    store.save(&second).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.history.len(), 2);
    assert_eq!(loaded.history[0].parts[0].as_text(), Some("hi"));
    assert_eq!(loaded.history[1].parts[0].as_text(), Some("bye"));
    assert_eq!(loaded.status.state, TaskState::Completed);
    assert!(!store.is_active("t1").unwrap());
    assert!(store.is_finalized("t1").unwrap());
}

#[test]
fn history_appends_never_rewrite_existing_rows() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    let first = Task::new("t1").with_message(Message::user("hi").with_id("m-0"));
    store.save(&first).unwrap();

    // Save again with a prefix-extended history; the prefix message carries
    // a different id, which must NOT reach the store: row 0 is immutable.
    let second = Task::new("t1")
        .with_message(Message::user("hi").with_id("m-0-rewritten"))
        .with_message(Message::agent("bye").with_id("m-1"));
    store.save(&second).unwrap();

    let conn = raw(&path);
    let rows: Vec<(String, i64)> = conn
        .prepare("SELECT message_id, sequence_num FROM history WHERE task_id = 't1' ORDER BY sequence_num")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], ("m-0".to_string(), 0));
    assert_eq!(rows[1], ("m-1".to_string(), 1));

    // Same-length and shorter inputs are no-ops.
    store
        .save(&Task::new("t1").with_message(Message::user("other").with_id("m-x")))
        .unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM history WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);

    // An empty history clears the rows.
    store.save(&Task::new("t1")).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM history WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn messages_without_ids_get_generated_row_ids() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    let mut message = Message::user("hi");
    message.id = None;
    store.save(&Task::new("t1").with_message(message)).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.history[0].id.as_deref(), Some("t1-msg-0"));
}

#[test]
fn upsert_keeps_a_single_record_row() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    for state in [TaskState::Submitted, TaskState::Working, TaskState::Completed] {
        store
            .save(&Task::new("t1").with_status(TaskStatus::new(state)))
            .unwrap();
    }

    let conn = raw(&path);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tasks WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    let state: String = conn
        .query_row("SELECT status_state FROM tasks WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(state, "completed");
}

#[test]
fn finalization_instant_is_preserved_across_terminal_saves() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    let done = Task::new("t1").with_status(TaskStatus::new(TaskState::Completed));
    store.save(&done).unwrap();

    let conn = raw(&path);
    let first: String = conn
        .query_row("SELECT finalized_at FROM tasks WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    store.save(&done).unwrap();

    let second: String = conn
        .query_row("SELECT finalized_at FROM tasks WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(first, second, "finalized_at moved on a repeated terminal save");
}

#[test]
fn artifact_save_replaces_the_previous_set() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    let first = Task::new("t1")
        .with_artifact(Artifact::text("a-0", "old"))
        .with_artifact(Artifact::text("a-1", "older"));
    store.save(&first).unwrap();

    let second = Task::new("t1").with_artifact(Artifact::text("a-2", "new"));
    store.save(&second).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.artifacts.len(), 1);
    assert_eq!(loaded.artifacts[0].id, "a-2");

    let conn = raw(&path);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM artifacts WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn get_missing_and_probes_on_missing() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    assert!(store.get("ghost").unwrap().is_none());
    assert!(!store.is_active("ghost").unwrap());
    assert!(!store.is_finalized("ghost").unwrap());
}

#[test]
fn blank_ids_are_rejected_everywhere() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    assert!(matches!(
        store.save(&Task::new("   ")),
        Err(TaskStoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.get(""),
        Err(TaskStoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.delete(" "),
        Err(TaskStoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.is_finalized(""),
        Err(TaskStoreError::InvalidArgument { .. })
    ));
}

#[test]
fn delete_cascades_to_history_and_artifacts() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    let task = Task::new("t1")
        .with_message(Message::user("hi"))
        .with_artifact(Artifact::text("a-0", "out"));
    store.save(&task).unwrap();
    store.delete("t1").unwrap();

    assert!(store.get("t1").unwrap().is_none());

    let conn = raw(&path);
    for table in ["tasks", "history", "artifacts"] {
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE task_id = 't1'"),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0, "{table} rows survived the delete");
    }
}

#[test]
fn cache_serves_repeat_reads_and_writes_invalidate() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    let working = Task::new("t1").with_status(TaskStatus::new(TaskState::Working));
    store.save(&working).unwrap();

    store.get("t1").unwrap();
    store.get("t1").unwrap();
    let stats = store.cache_stats().unwrap();
    assert!(stats.hits >= 1, "second read should hit the cache");

    // A save must evict; the next read sees the committed state, not the
    // cached snapshot.
    let done = Task::new("t1").with_status(TaskStatus::new(TaskState::Completed));
    store.save(&done).unwrap();
    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.status.state, TaskState::Completed);

    // Delete must evict too.
    store.delete("t1").unwrap();
    assert!(store.get("t1").unwrap().is_none());
}

#[test]
fn disabled_cache_still_serves_reads() {
    let dir = TempDir::new().unwrap();
    let (store, _) = open_store(
        &dir,
        TaskStoreConfig::default().with_cache(CacheSettings::disabled()),
    );

    store.save(&Task::new("t1")).unwrap();
    assert!(store.get("t1").unwrap().is_some());
    assert!(store.cache_stats().is_none());
}

#[test]
fn artifact_and_metadata_persistence_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let (store, path) = open_store(
        &dir,
        TaskStoreConfig::default()
            .with_store_artifacts(false)
            .with_store_metadata(false),
    );

    let task = Task::new("t1")
        .with_artifact(Artifact::text("a-0", "out"))
        .with_metadata("k", json!("v"));
    store.save(&task).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert!(loaded.artifacts.is_empty());
    assert!(loaded.metadata.is_empty());

    let conn = raw(&path);
    let artifact_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))
        .unwrap();
    assert_eq!(artifact_rows, 0);
    let metadata: Option<String> = conn
        .query_row("SELECT metadata_json FROM tasks WHERE task_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(metadata, None);
}

#[test]
fn table_prefix_is_applied() {
    let dir = TempDir::new().unwrap();
    let (store, path) = open_store(&dir, TaskStoreConfig::default().with_table_prefix("a2a_"));

    store.save(&Task::new("t1").with_message(Message::user("hi"))).unwrap();

    let conn = raw(&path);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM a2a_tasks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM a2a_history", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn batched_inserts_cover_histories_larger_than_one_chunk() {
    let dir = TempDir::new().unwrap();
    let (store, path) = open_store(&dir, TaskStoreConfig::default().with_batch_size(100));

    let mut task = Task::new("t1");
    for i in 0..250 {
        task = task.with_message(Message::user(format!("msg {i}")).with_id(format!("m-{i}")));
    }
    store.save(&task).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.history.len(), 250);
    assert_eq!(loaded.history[0].parts[0].as_text(), Some("msg 0"));
    assert_eq!(loaded.history[249].parts[0].as_text(), Some("msg 249"));

    let conn = raw(&path);
    let max_seq: i64 = conn
        .query_row("SELECT MAX(sequence_num) FROM history WHERE task_id = 't1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(max_seq, 249);
}

#[test]
fn legacy_doubly_encoded_rows_are_recovered_on_read() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    store.save(&Task::new("t1")).unwrap();

    // A row written by the old code path: the parts JSON serialized twice.
    let parts_once = serde_json::to_string(&json!([{"type": "TEXT", "text": "legacy"}])).unwrap();
    let parts_twice = serde_json::to_string(&parts_once).unwrap();
    let conn = raw(&path);
    conn.execute(
        "INSERT INTO history (task_id, message_id, role, content_json, metadata_json, sequence_num) \
         VALUES ('t1', 'm-legacy', 'user', ?1, NULL, 0)",
        rusqlite::params![parts_twice],
    )
    .unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.history.len(), 1);
    assert_eq!(loaded.history[0].parts[0].as_text(), Some("legacy"));
}

#[test]
fn unknown_status_state_reads_as_unknown_and_stays_active() {
    let dir = TempDir::new().unwrap();
    let (store, path) = default_store(&dir);

    store.save(&Task::new("t1")).unwrap();
    let conn = raw(&path);
    conn.execute(
        "UPDATE tasks SET status_state = 'paused' WHERE task_id = 't1'",
        [],
    )
    .unwrap();

    // Bypass the cached snapshot from any earlier read.
    let fresh = SqlTaskStore::connect(&path, TaskStoreConfig::default()).unwrap();
    let loaded = fresh.get("t1").unwrap().unwrap();
    assert_eq!(loaded.status.state, TaskState::Unknown);
    assert!(fresh.is_active("t1").unwrap());
}

#[test]
fn file_parts_round_trip_both_sources() {
    let dir = TempDir::new().unwrap();
    let (store, _) = default_store(&dir);

    let task = Task::new("t1").with_message(
        Message::agent("files")
            .with_part(Part::file_uri("https://example.com/out.pdf", "application/pdf"))
            .with_part(Part::file_bytes("aGVsbG8=", "text/plain")),
    );
    store.save(&task).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    let parts = &loaded.history[0].parts;
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[1], Part::file_uri("https://example.com/out.pdf", "application/pdf"));
    assert_eq!(parts[2], Part::file_bytes("aGVsbG8=", "text/plain"));
}
