//! Connection pool for SQLite with thread-safe resource management.

use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use taskvault_core::{StorageErrorKind, TaskResult, TaskStoreError};

/// Configuration for SQLite connections
#[derive(Debug, Clone)]
pub(crate) struct ConnectionConfig {
    pub wal_mode: bool,
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Fixed-size pool of SQLite connections with RAII checkout.
pub(crate) struct SqlitePool {
    available: Arc<Mutex<Vec<Connection>>>,
    active: Arc<Mutex<usize>>,
    path: PathBuf,
    pool_size: usize,
    config: ConnectionConfig,
}

impl SqlitePool {
    /// Create a pool of `pool_size` connections against the database file.
    pub fn new(path: impl AsRef<Path>, pool_size: usize) -> TaskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let config = ConnectionConfig::default();

        let mut available = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            available.push(Self::create_connection(&path, &config)?);
        }

        Ok(Self {
            available: Arc::new(Mutex::new(available)),
            active: Arc::new(Mutex::new(0)),
            path,
            pool_size,
            config,
        })
    }

    fn create_connection(path: &Path, config: &ConnectionConfig) -> TaskResult<Connection> {
        let conn = Connection::open(path).map_err(|e| {
            TaskStoreError::storage("sqlite connect", e.to_string(), StorageErrorKind::Connection)
        })?;

        let mut pragmas = String::new();
        if config.wal_mode {
            pragmas.push_str("PRAGMA journal_mode = WAL;\n");
        }
        pragmas.push_str("PRAGMA synchronous = NORMAL;\n");
        pragmas.push_str(&format!("PRAGMA busy_timeout = {};\n", config.busy_timeout_ms));
        // Cascade deletes from tasks to history/artifacts happen here.
        pragmas.push_str("PRAGMA foreign_keys = ON;\n");

        conn.execute_batch(&pragmas).map_err(|e| {
            TaskStoreError::storage(
                "sqlite configure",
                e.to_string(),
                StorageErrorKind::Connection,
            )
        })?;

        Ok(conn)
    }

    fn lock_error(what: &str) -> TaskStoreError {
        TaskStoreError::storage(
            "sqlite pool",
            format!("{what} lock poisoned"),
            StorageErrorKind::Connection,
        )
    }

    /// Check out a connection; returned to the pool on drop.
    pub fn acquire(&self) -> TaskResult<PooledConnection> {
        {
            let mut available = self.available.lock().map_err(|_| Self::lock_error("pool"))?;
            if let Some(conn) = available.pop() {
                let mut active = self.active.lock().map_err(|_| Self::lock_error("counter"))?;
                *active += 1;
                return Ok(PooledConnection::new(
                    conn,
                    Arc::clone(&self.available),
                    self.pool_size,
                    Arc::clone(&self.active),
                ));
            }
        }

        let mut active = self.active.lock().map_err(|_| Self::lock_error("counter"))?;
        if *active >= self.pool_size {
            return Err(TaskStoreError::storage(
                "sqlite pool",
                format!("all {} connections in use", self.pool_size),
                StorageErrorKind::Exhausted,
            ));
        }

        let conn = Self::create_connection(&self.path, &self.config)?;
        *active += 1;

        Ok(PooledConnection::new(
            conn,
            Arc::clone(&self.available),
            self.pool_size,
            Arc::clone(&self.active),
        ))
    }
}

/// RAII wrapper returning the connection to the pool on drop.
pub(crate) struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<Mutex<Vec<Connection>>>,
    pool_size: usize,
    active: Arc<Mutex<usize>>,
}

impl PooledConnection {
    fn new(
        connection: Connection,
        pool: Arc<Mutex<Vec<Connection>>>,
        pool_size: usize,
        active: Arc<Mutex<usize>>,
    ) -> Self {
        Self {
            connection: Some(connection),
            pool,
            pool_size,
            active,
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("BUG: PooledConnection has no connection")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("BUG: PooledConnection has no connection")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let (Ok(mut available), Ok(mut active)) = (self.pool.lock(), self.active.lock()) {
                *active = active.saturating_sub(1);
                if available.len() < self.pool_size {
                    available.push(conn);
                } else {
                    tracing::warn!(
                        available = available.len(),
                        pool_size = self.pool_size,
                        "pool full when returning sqlite connection"
                    );
                }
            } else {
                tracing::error!("failed to lock pool for connection return; connection dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_and_return_cycles_connections() {
        let dir = tempdir().unwrap();
        let pool = SqlitePool::new(dir.path().join("pool.db"), 2).unwrap();

        let first = pool.acquire().unwrap();
        let _second = pool.acquire().unwrap();
        assert!(pool.acquire().is_err(), "pool of 2 should be exhausted");

        drop(first);
        let _third = pool.acquire().unwrap();
    }

    #[test]
    fn connections_enable_wal_and_foreign_keys() {
        let dir = tempdir().unwrap();
        let pool = SqlitePool::new(dir.path().join("pragma.db"), 1).unwrap();
        let conn = pool.acquire().unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
