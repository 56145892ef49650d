//! Two-tier memoization with at-most-one concurrent compute per key.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use moka::sync::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::key::CacheKey;
use crate::store::{CacheStore, StoredEntry, Ttl};

type AnyValue = Arc<dyn Any + Send + Sync>;

/// Memory tier capacity when none is configured.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 256;

/// Per-call cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a persisted value stays valid.
    pub ttl: Ttl,
    /// Drop any cached value and recompute.
    pub force_refresh: bool,
}

impl CachePolicy {
    /// Policy with the given TTL and no forced refresh.
    pub fn new(ttl: Ttl) -> Self {
        Self {
            ttl,
            force_refresh: false,
        }
    }

    /// Set the force-refresh flag.
    pub fn with_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Ttl::Seconds(3600))
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub misses: u64,
    pub store_errors: u64,
}

impl CacheStats {
    /// Fraction of lookups served from either tier.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.store_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    misses: AtomicU64,
    store_errors: AtomicU64,
}

/// Bounded memory tier in front of an optional persistent store.
///
/// Memory entries stay fresh until evicted by capacity or invalidated.
/// Persistent entries are checked against the caller's TTL and promoted
/// into memory on hit. Store failures degrade to misses.
pub struct CacheManager {
    memory: Cache<String, AnyValue>,
    store: Option<Arc<dyn CacheStore>>,
    counters: Counters,
}

impl CacheManager {
    /// Create a manager backed by a persistent store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            memory: memory_tier(DEFAULT_MEMORY_CAPACITY),
            store: Some(store),
            counters: Counters::default(),
        }
    }

    /// Create a manager with only the memory tier.
    pub fn in_memory() -> Self {
        Self {
            memory: memory_tier(DEFAULT_MEMORY_CAPACITY),
            store: None,
            counters: Counters::default(),
        }
    }

    /// Bound the memory tier to `capacity` entries.
    pub fn with_memory_capacity(mut self, capacity: u64) -> Self {
        self.memory = memory_tier(capacity);
        self
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Concurrent callers with the same key run `compute` at most once; the
    /// others block until it finishes and then read its result. Errors from
    /// `compute` are returned to the caller that ran it and are not cached;
    /// callers that were waiting on a failed compute run their own.
    pub fn get_or_compute<T, E, F>(
        &self,
        key: &CacheKey,
        policy: CachePolicy,
        compute: F,
    ) -> Result<Arc<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        if policy.force_refresh {
            self.invalidate(key);
        }

        // `compute` is only consumed on the iteration that returns.
        let mut compute = Some(compute);
        let mut failure = None;
        loop {
            let mut initialized = false;
            let outcome = self.memory.try_get_with_by_ref(key.as_str(), || {
                initialized = true;
                let compute = compute.take().ok_or(())?;
                match self.load_or_compute(key, policy, compute) {
                    Ok(value) => Ok(value as AnyValue),
                    Err(e) => {
                        failure = Some(e);
                        Err(())
                    }
                }
            });

            match outcome {
                Ok(value) => match value.downcast::<T>() {
                    Ok(value) => {
                        if !initialized {
                            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                            debug!(key = %key, "cache hit (memory)");
                        }
                        return Ok(value);
                    }
                    Err(_) => {
                        debug!(key = %key, "memory entry has a different type, replacing");
                        self.memory.invalidate(key.as_str());
                    }
                },
                Err(_) if initialized => {
                    if let Some(e) = failure.take() {
                        return Err(e);
                    }
                }
                // Another caller's compute failed; run ours.
                Err(_) => {}
            }
        }
    }

    /// Remove `key` from both tiers.
    pub fn invalidate(&self, key: &CacheKey) {
        self.memory.invalidate(key.as_str());
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(key.as_str()) {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "failed to delete persisted cache entry");
            }
        }
        debug!(key = %key, "cache entry invalidated");
    }

    /// Empty both tiers.
    pub fn clear(&self) {
        self.memory.invalidate_all();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "failed to clear persistent cache");
            }
        }
    }

    /// Check whether the memory tier holds `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.memory.contains_key(key.as_str())
    }

    /// Number of entries in the memory tier.
    pub fn memory_len(&self) -> usize {
        self.memory.run_pending_tasks();
        self.memory.entry_count() as usize
    }

    /// Check if a persistent store is attached.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
        }
    }

    /// Runs as the memory tier's initializer, once per key at a time.
    fn load_or_compute<T, E, F>(
        &self,
        key: &CacheKey,
        policy: CachePolicy,
        compute: F,
    ) -> Result<Arc<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.store_get::<T>(key, policy.ttl) {
            self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache hit (store), promoting");
            return Ok(Arc::new(value));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "cache miss, computing");

        let value = Arc::new(compute()?);
        self.store_put(key, value.as_ref(), policy.ttl);
        Ok(value)
    }

    fn store_get<T: DeserializeOwned>(&self, key: &CacheKey, ttl: Ttl) -> Option<T> {
        let store = self.store.as_ref()?;

        let entry = match store.get(key.as_str()) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "cache store read failed, treating as miss");
                return None;
            }
        };

        if ttl.is_expired(entry.created_at, Utc::now()) {
            debug!(key = %key, created_at = %entry.created_at, "persisted entry expired");
            if let Err(e) = store.delete(key.as_str()) {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "failed to delete expired cache entry");
            }
            return None;
        }

        match serde_json::from_str(&entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "persisted entry does not decode, treating as miss");
                None
            }
        }
    }

    fn store_put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Ttl) {
        let Some(store) = &self.store else {
            return;
        };

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "failed to serialize value for cache store");
                return;
            }
        };

        if let Err(e) = store.put(StoredEntry::new(key.as_str(), payload, ttl)) {
            self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "cache store write failed");
        }
    }
}

fn memory_tier(capacity: u64) -> Cache<String, AnyValue> {
    Cache::builder().max_capacity(capacity).build()
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("memory_entries", &self.memory.entry_count())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    fn key(name: &str) -> CacheKey {
        CacheKey::builder("test").part("name", name).build()
    }

    #[test]
    fn test_compute_once_then_memory_hit() {
        let cache = CacheManager::in_memory();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![1u64, 2, 3])
        };

        let first = cache.get_or_compute(&key("a"), CachePolicy::default(), compute).unwrap();
        let second = cache
            .get_or_compute(&key("a"), CachePolicy::default(), || Ok::<_, ()>(vec![9u64]))
            .unwrap();

        assert_eq!(*first, vec![1, 2, 3]);
        assert_eq!(*second, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().memory_hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = CacheManager::in_memory();
        let err = cache.get_or_compute::<u64, _, _>(&key("e"), CachePolicy::default(), || {
            Err("boom")
        });
        assert_eq!(err.unwrap_err(), "boom");
        assert!(!cache.contains(&key("e")));

        let ok = cache
            .get_or_compute(&key("e"), CachePolicy::default(), || Ok::<_, &str>(5u64))
            .unwrap();
        assert_eq!(*ok, 5);
    }

    #[test]
    fn test_force_refresh_recomputes() {
        let cache = CacheManager::in_memory();
        cache
            .get_or_compute(&key("r"), CachePolicy::default(), || Ok::<_, ()>(1u64))
            .unwrap();
        let refreshed = cache
            .get_or_compute(
                &key("r"),
                CachePolicy::default().with_refresh(true),
                || Ok::<_, ()>(2u64),
            )
            .unwrap();
        assert_eq!(*refreshed, 2);
    }

    #[test]
    fn test_store_hit_is_promoted() {
        let store = Arc::new(MemoryStore::new());
        let writer = CacheManager::new(store.clone());
        writer
            .get_or_compute(&key("p"), CachePolicy::default(), || Ok::<_, ()>(7u64))
            .unwrap();

        // A fresh manager over the same store simulates a restart.
        let reader = CacheManager::new(store);
        let value = reader
            .get_or_compute(&key("p"), CachePolicy::default(), || Ok::<_, ()>(0u64))
            .unwrap();
        assert_eq!(*value, 7);
        assert_eq!(reader.stats().store_hits, 1);
        assert!(reader.contains(&key("p")));
    }

    #[test]
    fn test_memory_tier_is_bounded() {
        let cache = CacheManager::in_memory().with_memory_capacity(4);
        for i in 0..50u64 {
            cache
                .get_or_compute(&key(&i.to_string()), CachePolicy::default(), || Ok::<_, ()>(i))
                .unwrap();
        }
        assert!(cache.memory_len() <= 4);
        assert_eq!(cache.stats().misses, 50);
    }

    #[test]
    fn test_type_mismatch_recomputes() {
        let cache = CacheManager::in_memory();
        cache
            .get_or_compute(&key("t"), CachePolicy::default(), || Ok::<_, ()>(1u64))
            .unwrap();
        let value = cache
            .get_or_compute(&key("t"), CachePolicy::default(), || {
                Ok::<_, ()>("one".to_string())
            })
            .unwrap();
        assert_eq!(value.as_str(), "one");
    }

    #[test]
    fn test_invalidate_removes_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheManager::new(store.clone());
        cache
            .get_or_compute(&key("i"), CachePolicy::default(), || Ok::<_, ()>(1u64))
            .unwrap();
        assert_eq!(store.len(), 1);

        cache.invalidate(&key("i"));
        assert!(!cache.contains(&key("i")));
        assert!(store.is_empty());
    }
}
