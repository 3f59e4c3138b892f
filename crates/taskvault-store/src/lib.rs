//! # Taskvault Store
//!
//! Relational persistence for Taskvault tasks, over SQLite or PostgreSQL.
//!
//! The store maps the polymorphic task model onto three flat tables with
//! JSON-valued columns: one record row per task, append-only history rows,
//! and snapshot-replaced artifact rows. A bounded read-through cache keeps
//! recently loaded tasks in process, with finished tasks cached longer
//! than active ones.
//!
//! ## Backends
//!
//! The connection URL selects the backend: `postgres://...` uses native
//! `jsonb` columns and numbered parameters; anything else is treated as a
//! SQLite path (`sqlite://tasks.db`, `sqlite:tasks.db`, or a bare path).
//! JSON parameter shape is adapted per dialect, decided once at
//! construction.
//!
//! ## Example
//!
//! ```no_run
//! use taskvault_store::{SqlTaskStore, TaskStoreConfig};
//! use taskvault_core::{Message, Task, TaskState, TaskStatus, TaskStore};
//!
//! let store = SqlTaskStore::connect("sqlite:tasks.db", TaskStoreConfig::default()).unwrap();
//! store.ensure_schema().unwrap();
//!
//! let task = Task::new("task-001")
//!     .with_status(TaskStatus::new(TaskState::Working))
//!     .with_message(Message::user("hi"));
//! store.save(&task).unwrap();
//!
//! let loaded = store.get("task-001").unwrap().unwrap();
//! assert_eq!(loaded.history.len(), 1);
//! ```

// Re-export the model and contract so store users need one import path.
pub use taskvault_core::{
    Artifact, DataPart, FileContent, FilePart, FileSource, InMemoryTaskStore, Message, Part, Role,
    StorageErrorKind, Task, TaskResult, TaskState, TaskStatus, TaskStore, TaskStoreError, TextPart,
};

pub mod cache;
pub mod codec;
pub mod config;
pub mod dialect;
pub mod session;
pub mod store;

mod artifact;
mod history;
mod postgres;
mod record;
mod schema;
mod sql;
mod sqlite;

pub use cache::{CacheStats, Clock, SystemClock, TaskCache};
pub use config::{CacheSettings, TaskStoreConfig};
pub use dialect::{Dialect, JsonAdapter};
pub use session::{SqlRow, SqlSession, SqlValue, TransactionMode};
pub use store::SqlTaskStore;
