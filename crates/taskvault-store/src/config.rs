//! Store configuration.

use std::time::Duration;

/// Tuning for the relational task store.
#[derive(Debug, Clone)]
pub struct TaskStoreConfig {
    /// Persist and read artifacts; when false the artifact table is never
    /// touched and loaded tasks carry no artifacts
    pub store_artifacts: bool,

    /// Persist and read task metadata; same contract as `store_artifacts`
    pub store_metadata: bool,

    /// Rows per batched insert; bounds per-statement parameter counts
    pub batch_size: usize,

    /// Prefix applied to the three table names, threaded explicitly into
    /// the rendered statement set
    pub table_prefix: String,

    /// Connections held per backend pool
    pub pool_size: usize,

    /// Cache tuning
    pub cache: CacheSettings,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        Self {
            store_artifacts: true,
            store_metadata: true,
            batch_size: 100,
            table_prefix: String::new(),
            pool_size: 5,
            cache: CacheSettings::default(),
        }
    }
}

impl TaskStoreConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle artifact persistence
    pub fn with_store_artifacts(mut self, store_artifacts: bool) -> Self {
        self.store_artifacts = store_artifacts;
        self
    }

    /// Toggle metadata persistence
    pub fn with_store_metadata(mut self, store_metadata: bool) -> Self {
        self.store_metadata = store_metadata;
        self
    }

    /// Set the batched-insert chunk size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the table-name prefix
    pub fn with_table_prefix(mut self, table_prefix: impl Into<String>) -> Self {
        self.table_prefix = table_prefix.into();
        self
    }

    /// Set the pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Replace the cache settings
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }
}

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Whether the facade caches loaded tasks at all
    pub enabled: bool,

    /// TTL for tasks whose state is not terminal
    pub ttl_active: Duration,

    /// TTL for tasks in a terminal state; these never change again, so
    /// they are kept longer
    pub ttl_finalized: Duration,

    /// Maximum number of cached tasks
    pub max_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_active: Duration::from_secs(10 * 60),
            ttl_finalized: Duration::from_secs(60 * 60),
            max_size: 1000,
        }
    }
}

impl CacheSettings {
    /// Disable caching entirely
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the active-task TTL
    pub fn with_ttl_active(mut self, ttl: Duration) -> Self {
        self.ttl_active = ttl;
        self
    }

    /// Set the finalized-task TTL
    pub fn with_ttl_finalized(mut self, ttl: Duration) -> Self {
        self.ttl_finalized = ttl;
        self
    }

    /// Set the entry bound
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = TaskStoreConfig::default();
        assert!(config.store_artifacts);
        assert!(config.store_metadata);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.table_prefix, "");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_active, Duration::from_secs(600));
        assert_eq!(config.cache.ttl_finalized, Duration::from_secs(3600));
        assert_eq!(config.cache.max_size, 1000);
    }

    #[test]
    fn builders_compose() {
        let config = TaskStoreConfig::new()
            .with_store_artifacts(false)
            .with_table_prefix("a2a_")
            .with_cache(CacheSettings::disabled());
        assert!(!config.store_artifacts);
        assert_eq!(config.table_prefix, "a2a_");
        assert!(!config.cache.enabled);
    }
}
