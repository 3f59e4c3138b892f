//! # Taskvault Core
//!
//! The task state model and store contract for Taskvault.
//!
//! A [`Task`] bundles everything an agent accumulates while working on a
//! unit of work: a lifecycle [`TaskStatus`], an ordered history of
//! [`Message`]s, the [`Artifact`]s produced so far, and free-form metadata.
//! [`TaskStore`] is the persistence contract; [`InMemoryTaskStore`] is the
//! transient default implementation, and `taskvault-store` provides the
//! relational one.
//!
//! ## Example
//!
//! ```rust
//! use taskvault_core::{InMemoryTaskStore, Message, Task, TaskState, TaskStatus, TaskStore};
//!
//! let store = InMemoryTaskStore::new();
//!
//! let task = Task::new("task-001")
//!     .with_status(TaskStatus::new(TaskState::Working))
//!     .with_message(Message::user("Summarize this document"));
//! store.save(&task).unwrap();
//!
//! assert!(store.is_active("task-001").unwrap());
//!
//! let done = Task::new("task-001").with_status(TaskStatus::new(TaskState::Completed));
//! store.save(&done).unwrap();
//! assert!(store.is_finalized("task-001").unwrap());
//! ```

pub mod artifact;
pub mod error;
pub mod message;
pub mod part;
pub mod store;
pub mod task;

pub use artifact::Artifact;
pub use error::{StorageErrorKind, TaskResult, TaskStoreError};
pub use message::{Message, Role};
pub use part::{DataPart, FileContent, FilePart, FileSource, Part, TextPart};
pub use store::{InMemoryTaskStore, TaskStore, require_task_id};
pub use task::{Task, TaskState, TaskStatus};
