//! Error types for task store operations.

use thiserror::Error;

/// Result type for task store operations
pub type TaskResult<T> = Result<T, TaskStoreError>;

/// Errors surfaced by task store implementations.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// The caller passed an unusable argument (blank task id, malformed
    /// input). Never retried.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected
        reason: String,
    },

    /// A value could not be turned into JSON for persistence. Fatal to the
    /// enclosing save.
    #[error("failed to serialize {context}: {source}")]
    Serialization {
        /// What was being serialized
        context: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A stored JSON payload could not be parsed back, even after the
    /// legacy double-encoding recovery.
    #[error("failed to deserialize {context}: {detail}")]
    Deserialization {
        /// What was being deserialized
        context: String,
        /// Parse failure detail
        detail: String,
    },

    /// The underlying database failed. The enclosing transaction rolls
    /// back; nothing is retried internally.
    #[error("storage failure during {operation}: {detail}")]
    Storage {
        /// The store operation in flight
        operation: String,
        /// Driver failure detail
        detail: String,
        /// Classification of the failure
        kind: StorageErrorKind,
    },
}

/// Classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// A unique constraint rejected an insert. The record upsert converts
    /// this into a retry-as-update instead of surfacing it.
    UniqueViolation,

    /// Connection establishment or checkout failed
    Connection,

    /// The connection pool had no capacity left
    Exhausted,

    /// Transaction control (begin/commit/rollback) failed
    Transaction,

    /// Statement execution or row decoding failed
    Statement,
}

impl TaskStoreError {
    /// Create an invalid-argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create a deserialization error
    pub fn deserialization(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Deserialization {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Create a storage error
    pub fn storage(
        operation: impl Into<String>,
        detail: impl Into<String>,
        kind: StorageErrorKind,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            detail: detail.into(),
            kind,
        }
    }

    /// True for the insert-raced-with-concurrent-insert failure that the
    /// record upsert absorbs.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Storage {
                kind: StorageErrorKind::UniqueViolation,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_predicate() {
        let err = TaskStoreError::storage("insert", "duplicate key", StorageErrorKind::UniqueViolation);
        assert!(err.is_unique_violation());

        let err = TaskStoreError::storage("insert", "disk full", StorageErrorKind::Statement);
        assert!(!err.is_unique_violation());

        let err = TaskStoreError::invalid_argument("blank id");
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn display_includes_context() {
        let err = TaskStoreError::deserialization("history content", "not valid JSON");
        assert_eq!(
            err.to_string(),
            "failed to deserialize history content: not valid JSON"
        );
    }
}
