//! The relational task store facade.

use std::collections::HashMap;
use std::sync::Arc;

use taskvault_core::{
    Task, TaskResult, TaskState, TaskStatus, TaskStore, require_task_id,
};

use crate::artifact::ArtifactStore;
use crate::cache::{CacheStats, TaskCache};
use crate::codec;
use crate::config::TaskStoreConfig;
use crate::dialect::{Dialect, JsonAdapter};
use crate::history::HistoryStore;
use crate::postgres::PostgresBackend;
use crate::record::TaskRecordStore;
use crate::schema;
use crate::session::{SqlSession, TransactionMode};
use crate::sql::Statements;
use crate::sqlite::SqliteBackend;

enum Backend {
    Sqlite(SqliteBackend),
    Postgres(PostgresBackend),
}

impl Backend {
    fn session(&self) -> TaskResult<Box<dyn SqlSession>> {
        match self {
            Backend::Sqlite(backend) => Ok(Box::new(backend.session()?)),
            Backend::Postgres(backend) => Ok(Box::new(backend.session()?)),
        }
    }
}

/// SQL-backed [`TaskStore`] over SQLite or PostgreSQL.
///
/// Composes the record, history, and artifact stores with the read-through
/// cache. Each `save`/`get`/`delete` runs inside one explicit transaction on
/// one pooled connection; the state probes are single statements outside
/// any explicit transaction. Any successful write evicts the cache entry
/// for that task id — eviction, not update, so the cache never holds a
/// snapshot that differs from what actually committed.
pub struct SqlTaskStore {
    backend: Backend,
    dialect: Dialect,
    config: TaskStoreConfig,
    records: TaskRecordStore,
    history: HistoryStore,
    artifacts: ArtifactStore,
    cache: Option<TaskCache>,
}

impl SqlTaskStore {
    /// Connect to the database behind `url` and build the store.
    ///
    /// The dialect (and with it the JSON parameter strategy) is detected
    /// here, once, from the URL scheme.
    pub fn connect(url: &str, config: TaskStoreConfig) -> TaskResult<Self> {
        let dialect = Dialect::from_url(url);
        let adapter = JsonAdapter::for_dialect(dialect);
        let statements = Arc::new(Statements::new(&config.table_prefix));

        let backend = match dialect {
            Dialect::Sqlite => Backend::Sqlite(SqliteBackend::connect(url, config.pool_size)?),
            Dialect::Postgres => {
                Backend::Postgres(PostgresBackend::connect(url, config.pool_size)?)
            }
        };

        let cache = config
            .cache
            .enabled
            .then(|| TaskCache::new(&config.cache));

        tracing::debug!(%dialect, table_prefix = %config.table_prefix, "connected task store");

        Ok(Self {
            backend,
            dialect,
            records: TaskRecordStore::new(Arc::clone(&statements), adapter),
            history: HistoryStore::new(Arc::clone(&statements), adapter, config.batch_size),
            artifacts: ArtifactStore::new(statements, adapter, config.batch_size),
            cache,
            config,
        })
    }

    /// The dialect detected at construction
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Cache counters, when the cache is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(TaskCache::stats)
    }

    /// Create the fixed schema if it does not exist yet.
    ///
    /// For embedded SQLite use and test setup; hosted deployments normally
    /// provision the schema themselves.
    pub fn ensure_schema(&self) -> TaskResult<()> {
        let mut session = self.backend.session()?;
        for statement in schema::ddl(self.dialect, &self.config.table_prefix) {
            session.execute(&statement, &[])?;
        }
        Ok(())
    }

    fn save_all(&self, session: &mut dyn SqlSession, task: &Task) -> TaskResult<()> {
        self.records.save(session, task)?;
        self.history.save_all(session, &task.id, &task.history)?;
        if self.config.store_artifacts {
            self.artifacts.save_all(session, &task.id, &task.artifacts)?;
        }
        if self.config.store_metadata {
            self.records
                .update_metadata(session, &task.id, &task.metadata)?;
        }
        Ok(())
    }

    fn load_task(&self, session: &mut dyn SqlSession, task_id: &str) -> TaskResult<Option<Task>> {
        let Some(row) = self.records.find_by_id(session, task_id)? else {
            return Ok(None);
        };

        let status_message = row
            .status_message
            .map(|tree| {
                let tree = codec::recover_tree(tree, "status message");
                codec::decode_message(&tree, "status message")
            })
            .transpose()?;
        let status = TaskStatus {
            state: TaskState::parse(&row.status_state),
            message: status_message,
            timestamp: row.status_timestamp,
        };

        let history = self.history.find_by_task_id(session, task_id)?;
        let artifacts = if self.config.store_artifacts {
            self.artifacts.find_by_task_id(session, task_id)?
        } else {
            Vec::new()
        };
        let metadata = if self.config.store_metadata {
            codec::metadata_from_tree(row.metadata, "task metadata")?
        } else {
            HashMap::new()
        };

        Ok(Some(Task {
            id: row.task_id,
            context_id: row.context_id,
            status,
            history,
            artifacts,
            metadata,
        }))
    }

    fn in_write_transaction<F>(&self, operation: F) -> TaskResult<()>
    where
        F: FnOnce(&mut dyn SqlSession) -> TaskResult<()>,
    {
        let mut session = self.backend.session()?;
        session.begin(TransactionMode::ReadWrite)?;
        match operation(session.as_mut()) {
            Ok(()) => session.commit(),
            Err(e) => {
                if let Err(rollback_err) = session.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

impl TaskStore for SqlTaskStore {
    fn save(&self, task: &Task) -> TaskResult<()> {
        require_task_id(&task.id)?;

        self.in_write_transaction(|session| self.save_all(session, task))?;

        if let Some(cache) = &self.cache {
            cache.evict(&task.id);
        }
        tracing::debug!(task_id = %task.id, state = %task.status.state, "saved task");
        Ok(())
    }

    fn get(&self, task_id: &str) -> TaskResult<Option<Task>> {
        require_task_id(task_id)?;

        if let Some(cache) = &self.cache {
            if let Some(task) = cache.get(task_id) {
                return Ok(Some(task));
            }
        }

        let mut session = self.backend.session()?;
        session.begin(TransactionMode::ReadOnly)?;
        let loaded = self.load_task(session.as_mut(), task_id);
        match &loaded {
            Ok(_) => session.commit()?,
            Err(_) => {
                if let Err(rollback_err) = session.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
            }
        }
        let loaded = loaded?;

        if let Some(cache) = &self.cache {
            if let Some(task) = &loaded {
                cache.insert(task);
            }
        }
        Ok(loaded)
    }

    fn delete(&self, task_id: &str) -> TaskResult<()> {
        require_task_id(task_id)?;

        self.in_write_transaction(|session| self.records.delete(session, task_id))?;

        if let Some(cache) = &self.cache {
            cache.evict(task_id);
        }
        tracing::debug!(task_id, "deleted task");
        Ok(())
    }

    fn is_active(&self, task_id: &str) -> TaskResult<bool> {
        require_task_id(task_id)?;
        let mut session = self.backend.session()?;
        self.records.is_active(session.as_mut(), task_id)
    }

    fn is_finalized(&self, task_id: &str) -> TaskResult<bool> {
        require_task_id(task_id)?;
        let mut session = self.backend.session()?;
        self.records.is_finalized(session.as_mut(), task_id)
    }
}
