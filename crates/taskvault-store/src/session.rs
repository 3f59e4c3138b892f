//! Dialect-neutral SQL session interface.
//!
//! The row stores are written once against [`SqlSession`]; the `sqlite` and
//! `postgres` modules provide the backend implementations. One session wraps
//! one pooled connection, checked out for the duration of a facade call and
//! returned on drop.

use chrono::{DateTime, Utc};

use taskvault_core::{StorageErrorKind, TaskResult, TaskStoreError};

/// A SQL statement parameter.
///
/// `Json` carries serialized JSON bound as plain text — accepted by engines
/// whose JSON columns are text-affine. `Jsonb` carries a parsed tree bound
/// through the driver's native JSON parameter type, required by engines that
/// reject plain strings for JSON-typed columns. The dialect adapter decides
/// which of the two a JSON payload becomes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,

    /// Text value
    Text(String),

    /// 64-bit integer value
    Int(i64),

    /// Timestamp value; stored as RFC 3339 text on text-affine engines
    Timestamp(DateTime<Utc>),

    /// Serialized JSON bound as plain text
    Json(String),

    /// Parsed JSON bound as a native JSON parameter
    Jsonb(serde_json::Value),
}

/// Transaction mode for [`SqlSession::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; engines that support it may take weaker locks
    ReadOnly,

    /// Reads and writes
    ReadWrite,
}

/// One checked-out connection speaking positional-`?` SQL.
///
/// Statement text uses `?` placeholders regardless of backend; backends that
/// number their parameters rewrite before dispatch.
pub trait SqlSession {
    /// Execute a statement, returning the number of affected rows
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> TaskResult<u64>;

    /// Run a query, returning all rows
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> TaskResult<Vec<SqlRow>>;

    /// Open a transaction on this session
    fn begin(&mut self, mode: TransactionMode) -> TaskResult<()>;

    /// Commit the open transaction
    fn commit(&mut self) -> TaskResult<()>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> TaskResult<()>;
}

/// One result row, positionally indexed in SELECT order.
#[derive(Debug, Clone)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub(crate) fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    fn value(&self, idx: usize) -> TaskResult<&SqlValue> {
        self.values.get(idx).ok_or_else(|| {
            TaskStoreError::storage(
                "row read",
                format!("column index {idx} out of range ({} columns)", self.values.len()),
                StorageErrorKind::Statement,
            )
        })
    }

    fn type_error(idx: usize, expected: &str, got: &SqlValue) -> TaskStoreError {
        TaskStoreError::storage(
            "row read",
            format!("column {idx}: expected {expected}, got {got:?}"),
            StorageErrorKind::Statement,
        )
    }

    /// Required text column
    pub fn text(&self, idx: usize) -> TaskResult<&str> {
        match self.value(idx)? {
            SqlValue::Text(s) | SqlValue::Json(s) => Ok(s),
            other => Err(Self::type_error(idx, "text", other)),
        }
    }

    /// Nullable text column
    pub fn opt_text(&self, idx: usize) -> TaskResult<Option<&str>> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) | SqlValue::Json(s) => Ok(Some(s)),
            other => Err(Self::type_error(idx, "text or null", other)),
        }
    }

    /// Required integer column
    pub fn int(&self, idx: usize) -> TaskResult<i64> {
        match self.value(idx)? {
            SqlValue::Int(i) => Ok(*i),
            other => Err(Self::type_error(idx, "integer", other)),
        }
    }

    /// Required timestamp column; text-affine engines store RFC 3339 text
    pub fn timestamp(&self, idx: usize) -> TaskResult<DateTime<Utc>> {
        match self.opt_timestamp(idx)? {
            Some(ts) => Ok(ts),
            None => Err(TaskStoreError::storage(
                "row read",
                format!("column {idx}: unexpected NULL timestamp"),
                StorageErrorKind::Statement,
            )),
        }
    }

    /// Nullable timestamp column
    pub fn opt_timestamp(&self, idx: usize) -> TaskResult<Option<DateTime<Utc>>> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(ts) => Ok(Some(*ts)),
            SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| {
                    TaskStoreError::storage(
                        "row read",
                        format!("column {idx}: invalid timestamp text: {e}"),
                        StorageErrorKind::Statement,
                    )
                }),
            other => Err(Self::type_error(idx, "timestamp or null", other)),
        }
    }

    /// Nullable JSON column, parsed into a tree. Engines with native JSON
    /// columns hand the tree back directly; text-affine engines store text
    /// that is parsed here.
    pub fn opt_json(&self, idx: usize) -> TaskResult<Option<serde_json::Value>> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Jsonb(value) => Ok(Some(value.clone())),
            SqlValue::Text(s) | SqlValue::Json(s) => serde_json::from_str(s)
                .map(Some)
                .map_err(|e| {
                    TaskStoreError::deserialization(
                        format!("JSON column {idx}"),
                        e.to_string(),
                    )
                }),
            other => Err(Self::type_error(idx, "json or null", other)),
        }
    }
}
