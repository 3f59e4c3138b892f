//! SQLite backend: WAL mode, pooled connections, text-affine JSON columns.

use rusqlite::ErrorCode;
use rusqlite::types::ValueRef;

use taskvault_core::{StorageErrorKind, TaskResult, TaskStoreError};

use crate::session::{SqlRow, SqlSession, SqlValue, TransactionMode};

mod pool;

pub(crate) use pool::{PooledConnection, SqlitePool};

/// SQLite-backed store backend.
pub(crate) struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open the backend against a database path or `sqlite:`-style URL.
    pub fn connect(url: &str, pool_size: usize) -> TaskResult<Self> {
        let path = Self::strip_scheme(url);
        if path.is_empty() {
            return Err(TaskStoreError::invalid_argument(
                "sqlite URL has no database path",
            ));
        }
        Ok(Self {
            pool: SqlitePool::new(path, pool_size)?,
        })
    }

    fn strip_scheme(url: &str) -> &str {
        url.strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
    }

    pub fn session(&self) -> TaskResult<SqliteSession> {
        Ok(SqliteSession {
            conn: self.pool.acquire()?,
        })
    }
}

/// One checked-out SQLite connection.
pub(crate) struct SqliteSession {
    conn: PooledConnection,
}

fn classify(e: &rusqlite::Error) -> StorageErrorKind {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StorageErrorKind::UniqueViolation,
        _ => StorageErrorKind::Statement,
    }
}

fn statement_error(operation: &str, e: &rusqlite::Error) -> TaskStoreError {
    TaskStoreError::storage(operation, e.to_string(), classify(e))
}

fn bind_values(params: &[SqlValue]) -> Vec<rusqlite::types::Value> {
    params
        .iter()
        .map(|value| match value {
            SqlValue::Null => rusqlite::types::Value::Null,
            SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
            SqlValue::Int(i) => rusqlite::types::Value::Integer(*i),
            SqlValue::Timestamp(ts) => rusqlite::types::Value::Text(ts.to_rfc3339()),
            SqlValue::Json(s) => rusqlite::types::Value::Text(s.clone()),
            // Typed JSON only arrives here if the adapter was misconfigured;
            // text is what this engine stores anyway.
            SqlValue::Jsonb(v) => rusqlite::types::Value::Text(v.to_string()),
        })
        .collect()
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Text(f.to_string()),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

impl SqlSession for SqliteSession {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> TaskResult<u64> {
        self.conn
            .execute(sql, rusqlite::params_from_iter(bind_values(params)))
            .map(|rows| rows as u64)
            .map_err(|e| statement_error("execute", &e))
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> TaskResult<Vec<SqlRow>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| statement_error("prepare", &e))?;
        let column_count = stmt.column_count();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(bind_values(params)))
            .map_err(|e| statement_error("query", &e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| statement_error("query", &e))? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| statement_error("row read", &e))?;
                values.push(read_value(value));
            }
            out.push(SqlRow::new(values));
        }
        Ok(out)
    }

    fn begin(&mut self, mode: TransactionMode) -> TaskResult<()> {
        // SQLite has no read-only transactions; a deferred BEGIN takes no
        // lock until the first write.
        let sql = match mode {
            TransactionMode::ReadOnly => "BEGIN",
            TransactionMode::ReadWrite => "BEGIN IMMEDIATE",
        };
        self.conn.execute_batch(sql).map_err(|e| {
            TaskStoreError::storage("begin", e.to_string(), StorageErrorKind::Transaction)
        })
    }

    fn commit(&mut self) -> TaskResult<()> {
        self.conn.execute_batch("COMMIT").map_err(|e| {
            TaskStoreError::storage("commit", e.to_string(), StorageErrorKind::Transaction)
        })
    }

    fn rollback(&mut self) -> TaskResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(|e| {
            TaskStoreError::storage("rollback", e.to_string(), StorageErrorKind::Transaction)
        })
    }
}
