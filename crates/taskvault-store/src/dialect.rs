//! Database dialect detection and JSON parameter adaptation.

use taskvault_core::{TaskResult, TaskStoreError};

use crate::session::SqlValue;

/// The database engine family behind a connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite (file paths, `sqlite:` URLs); JSON columns are text-affine
    Sqlite,

    /// PostgreSQL; JSON columns are native `jsonb`
    Postgres,
}

impl Dialect {
    /// Detect the dialect from a connection URL, once, at construction.
    ///
    /// Anything that is not recognizably PostgreSQL falls back to the
    /// text-affine treatment rather than failing.
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split("://").next().unwrap_or("");
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Dialect::Postgres,
            _ => Dialect::Sqlite,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Sqlite => f.write_str("sqlite"),
            Dialect::Postgres => f.write_str("postgres"),
        }
    }
}

/// Strategy turning serialized JSON into the parameter shape the engine
/// accepts for its JSON columns. Selected once per store from the dialect;
/// no per-call branching on driver types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonAdapter {
    /// Bind the JSON string as plain text (SQLite and anything text-affine)
    Passthrough,

    /// Parse and bind as a native JSON parameter; the PostgreSQL driver
    /// rejects plain strings for `jsonb` columns
    Postgres,
}

impl JsonAdapter {
    /// The adapter matching a detected dialect
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Sqlite => JsonAdapter::Passthrough,
            Dialect::Postgres => JsonAdapter::Postgres,
        }
    }

    /// Adapt serialized JSON (or its absence) into a bindable parameter.
    pub fn adapt(&self, json: Option<String>) -> TaskResult<SqlValue> {
        let Some(raw) = json else {
            return Ok(SqlValue::Null);
        };
        match self {
            JsonAdapter::Passthrough => Ok(SqlValue::Json(raw)),
            JsonAdapter::Postgres => serde_json::from_str(&raw)
                .map(SqlValue::Jsonb)
                .map_err(|e| TaskStoreError::serialization("JSON parameter", e)),
        }
    }
}
