//! PostgreSQL backend: native JSONB columns, numbered parameters, a
//! synchronous face over the async driver.

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

use taskvault_core::{StorageErrorKind, TaskResult, TaskStoreError};

use crate::session::{SqlRow, SqlSession, SqlValue, TransactionMode};

mod pool;

pub(crate) use pool::{PooledClient, PostgresPool};

/// PostgreSQL-backed store backend.
pub(crate) struct PostgresBackend {
    pool: PostgresPool,
}

impl PostgresBackend {
    pub fn connect(url: &str, pool_size: usize) -> TaskResult<Self> {
        Ok(Self {
            pool: PostgresPool::new(url, pool_size)?,
        })
    }

    pub fn session(&self) -> TaskResult<PostgresSession> {
        Ok(PostgresSession {
            client: self.pool.acquire()?,
            runtime: self.pool.runtime(),
        })
    }
}

/// One checked-out PostgreSQL client.
pub(crate) struct PostgresSession {
    client: PooledClient,
    runtime: Arc<Runtime>,
}

/// Rewrite positional `?` placeholders to this engine's `$n` form. The
/// statement set never contains a literal `?`.
pub(crate) fn numbered(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

fn classify(e: &tokio_postgres::Error) -> StorageErrorKind {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        StorageErrorKind::UniqueViolation
    } else {
        StorageErrorKind::Statement
    }
}

fn statement_error(operation: &str, e: &tokio_postgres::Error) -> TaskStoreError {
    TaskStoreError::storage(operation, e.to_string(), classify(e))
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Text(s) => s.to_sql(ty, out),
            SqlValue::Int(i) => i.to_sql(ty, out),
            SqlValue::Timestamp(ts) => ts.to_sql(ty, out),
            // Plain text offered to a json/jsonb column; this engine's
            // driver rejects it, which is exactly what the adapter exists
            // to prevent.
            SqlValue::Json(s) => s.to_sql(ty, out),
            SqlValue::Jsonb(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn read_column(row: &Row, idx: usize) -> Result<SqlValue, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_();
    if *ty == Type::INT8 {
        Ok(row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Int))
    } else if *ty == Type::INT4 {
        Ok(row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(SqlValue::Null, |i| SqlValue::Int(i64::from(i))))
    } else if *ty == Type::TIMESTAMPTZ {
        Ok(row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Timestamp))
    } else if *ty == Type::JSONB || *ty == Type::JSON {
        Ok(row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Jsonb))
    } else {
        Ok(row
            .try_get::<_, Option<String>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Text))
    }
}

impl SqlSession for PostgresSession {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> TaskResult<u64> {
        let sql = numbered(sql);
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.runtime
            .block_on(self.client.execute(sql.as_str(), &bound))
            .map_err(|e| statement_error("execute", &e))
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> TaskResult<Vec<SqlRow>> {
        let sql = numbered(sql);
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self
            .runtime
            .block_on(self.client.query(sql.as_str(), &bound))
            .map_err(|e| statement_error("query", &e))?;

        rows.iter()
            .map(|row| {
                let values = (0..row.columns().len())
                    .map(|idx| read_column(row, idx))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| statement_error("row read", &e))?;
                Ok(SqlRow::new(values))
            })
            .collect()
    }

    fn begin(&mut self, mode: TransactionMode) -> TaskResult<()> {
        let sql = match mode {
            TransactionMode::ReadOnly => "BEGIN READ ONLY",
            TransactionMode::ReadWrite => "BEGIN",
        };
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(|e| {
                TaskStoreError::storage("begin", e.to_string(), StorageErrorKind::Transaction)
            })
    }

    fn commit(&mut self) -> TaskResult<()> {
        self.runtime
            .block_on(self.client.batch_execute("COMMIT"))
            .map_err(|e| {
                TaskStoreError::storage("commit", e.to_string(), StorageErrorKind::Transaction)
            })
    }

    fn rollback(&mut self) -> TaskResult<()> {
        self.runtime
            .block_on(self.client.batch_execute("ROLLBACK"))
            .map_err(|e| {
                TaskStoreError::storage("rollback", e.to_string(), StorageErrorKind::Transaction)
            })
    }
}
