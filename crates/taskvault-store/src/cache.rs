//! In-process task cache with state-dependent expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskvault_core::Task;

use crate::config::CacheSettings;

/// Time source for cache expiry. Production uses [`SystemClock`]; tests
/// drive a manual clock so TTL behavior is observable without sleeping.
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hit/miss/eviction counters for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that went to the store
    pub misses: u64,
    /// Entries removed to make room
    pub evictions: u64,
}

struct CacheEntry {
    task: Task,
    expires_at: Instant,
    last_access: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

/// Bounded read-through cache keyed by task id.
///
/// Entries carry a TTL chosen at insertion: tasks in a terminal state never
/// change again, so they live longer than active tasks whose snapshots go
/// stale on the next save. Capacity overflow evicts the least-recently-used
/// entry. Absent results are never cached.
///
/// Writers evict rather than update; a concurrent reader may repopulate a
/// stale snapshot, which the next write evicts again. See the concurrency
/// notes on the facade.
pub struct TaskCache {
    inner: Mutex<CacheInner>,
    ttl_active: Duration,
    ttl_finalized: Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TaskCache {
    /// Create a cache from settings, using the system clock.
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source.
    pub fn with_clock(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            ttl_active: settings.ttl_active,
            ttl_finalized: settings.ttl_finalized,
            max_size: settings.max_size.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up an unexpired entry, refreshing its recency.
    pub fn get(&self, task_id: &str) -> Option<Task> {
        let now = self.clock.now();
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };

        match inner.entries.get(task_id) {
            Some(entry) if entry.expires_at > now => {
                let task = entry.task.clone();
                inner.tick += 1;
                let tick = inner.tick;
                if let Some(entry) = inner.entries.get_mut(task_id) {
                    entry.last_access = tick;
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(task)
            }
            Some(_) => {
                inner.entries.remove(task_id);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a loaded task, TTL chosen by its terminal state.
    pub fn insert(&self, task: &Task) {
        let ttl = if task.status.state.is_terminal() {
            self.ttl_finalized
        } else {
            self.ttl_active
        };
        let now = self.clock.now();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if !inner.entries.contains_key(&task.id) && inner.entries.len() >= self.max_size {
            self.evict_lru(&mut inner, now);
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            task.id.clone(),
            CacheEntry {
                task: task.clone(),
                expires_at: now + ttl,
                last_access: tick,
            },
        );
    }

    fn evict_lru(&self, inner: &mut CacheInner, now: Instant) {
        // Expired entries go first; otherwise the coldest entry does.
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if !expired.is_empty() {
            for id in expired {
                inner.entries.remove(&id);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        if let Some(coldest) = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(id, _)| id.clone())
        {
            inner.entries.remove(&coldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop the entry for a task id, if any.
    pub fn evict(&self, task_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.remove(task_id);
        }
    }

    /// Number of live entries (expired ones included until touched)
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taskvault_core::{TaskState, TaskStatus};

    /// Manually advanced clock
    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            enabled: true,
            ttl_active: Duration::from_secs(600),
            ttl_finalized: Duration::from_secs(3600),
            max_size: 3,
        }
    }

    fn active_task(id: &str) -> taskvault_core::Task {
        taskvault_core::Task::new(id).with_status(TaskStatus::new(TaskState::Working))
    }

    fn finished_task(id: &str) -> taskvault_core::Task {
        taskvault_core::Task::new(id).with_status(TaskStatus::new(TaskState::Completed))
    }

    #[test]
    fn get_miss_then_hit() {
        let cache = TaskCache::new(&settings());
        assert!(cache.get("t1").is_none());

        cache.insert(&active_task("t1"));
        assert_eq!(cache.get("t1").unwrap().id, "t1");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn active_entries_expire_at_the_short_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = TaskCache::with_clock(&settings(), Arc::clone(&clock) as Arc<dyn Clock>);

        cache.insert(&active_task("t1"));
        clock.advance(Duration::from_secs(601));
        assert!(cache.get("t1").is_none());
    }

    #[test]
    fn finalized_entries_outlive_the_active_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = TaskCache::with_clock(&settings(), Arc::clone(&clock) as Arc<dyn Clock>);

        cache.insert(&finished_task("t1"));
        clock.advance(Duration::from_secs(601));
        assert!(cache.get("t1").is_some(), "terminal entry expired too early");

        clock.advance(Duration::from_secs(3600));
        assert!(cache.get("t1").is_none());
    }

    #[test]
    fn eviction_removes_the_least_recently_used_entry() {
        let cache = TaskCache::new(&settings());
        cache.insert(&active_task("t1"));
        cache.insert(&active_task("t2"));
        cache.insert(&active_task("t3"));

        // Touch t1 so t2 is the coldest.
        cache.get("t1");

        cache.insert(&active_task("t4"));
        assert!(cache.get("t2").is_none(), "coldest entry should be evicted");
        assert!(cache.get("t1").is_some());
        assert!(cache.get("t4").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn explicit_evict_removes_the_entry() {
        let cache = TaskCache::new(&settings());
        cache.insert(&active_task("t1"));
        cache.evict("t1");
        assert!(cache.get("t1").is_none());
    }

    #[test]
    fn reinsert_replaces_without_eviction() {
        let cache = TaskCache::new(&settings());
        cache.insert(&active_task("t1"));
        cache.insert(&finished_task("t1"));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("t1").unwrap().status.state,
            TaskState::Completed
        );
    }
}
