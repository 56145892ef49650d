use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use treetally_cache::{
    CacheError, CacheKey, CacheManager, CachePolicy, CacheStore, DiskStore, MemoryStore,
    StoredEntry, Ttl,
};

fn key(name: &str) -> CacheKey {
    CacheKey::builder("levels").part("source", name).build()
}

/// Store whose every operation fails.
struct BrokenStore;

impl CacheStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<StoredEntry>, CacheError> {
        Err(CacheError::Unavailable {
            message: "offline".to_string(),
        })
    }

    fn put(&self, _entry: StoredEntry) -> Result<(), CacheError> {
        Err(CacheError::Unavailable {
            message: "offline".to_string(),
        })
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable {
            message: "offline".to_string(),
        })
    }

    fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable {
            message: "offline".to_string(),
        })
    }
}

#[test]
fn test_concurrent_callers_compute_once() {
    let cache = Arc::new(CacheManager::in_memory());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compute(&key("shared"), CachePolicy::default(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the slot long enough for the others to queue up
                        thread::sleep(Duration::from_millis(50));
                        Ok::<_, ()>(42u64)
                    })
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(*handle.join().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.memory_hits, 7);
}

#[test]
fn test_distinct_keys_compute_independently() {
    let cache = CacheManager::in_memory();
    let a = cache
        .get_or_compute(&key("a"), CachePolicy::default(), || Ok::<_, ()>(1u64))
        .unwrap();
    let b = cache
        .get_or_compute(&key("b"), CachePolicy::default(), || Ok::<_, ()>(2u64))
        .unwrap();
    assert_eq!((*a, *b), (1, 2));
    assert_eq!(cache.memory_len(), 2);
}

#[test]
fn test_expired_store_entry_is_recomputed() {
    let store = Arc::new(MemoryStore::new());
    let mut stale = StoredEntry::new(key("old").as_str(), "1".to_string(), Ttl::Seconds(60));
    stale.created_at = Utc::now() - chrono::Duration::seconds(600);
    store.put(stale).unwrap();

    let cache = CacheManager::new(store.clone());
    let value = cache
        .get_or_compute(&key("old"), CachePolicy::new(Ttl::Seconds(60)), || {
            Ok::<_, ()>(2u64)
        })
        .unwrap();

    assert_eq!(*value, 2);
    assert_eq!(cache.stats().store_hits, 0);
    let fresh = store.get(key("old").as_str()).unwrap().unwrap();
    assert_eq!(fresh.payload, "2");
}

#[test]
fn test_caller_ttl_governs_store_hits() {
    let store = Arc::new(MemoryStore::new());
    let mut entry = StoredEntry::new(key("ttl").as_str(), "5".to_string(), Ttl::Unbounded);
    entry.created_at = Utc::now() - chrono::Duration::seconds(120);
    store.put(entry).unwrap();

    let cache = CacheManager::new(store);
    let value = cache
        .get_or_compute(&key("ttl"), CachePolicy::new(Ttl::Seconds(30)), || {
            Ok::<_, ()>(6u64)
        })
        .unwrap();
    assert_eq!(*value, 6);
}

#[test]
fn test_broken_store_degrades_to_memory() {
    let cache = CacheManager::new(Arc::new(BrokenStore));
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .get_or_compute(&key("x"), CachePolicy::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("value".to_string())
            })
            .unwrap();
        assert_eq!(value.as_str(), "value");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.stats().store_errors >= 2);
}

#[test]
fn test_undecodable_store_payload_is_a_miss() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(StoredEntry::new(
            key("garbled").as_str(),
            "{not json".to_string(),
            Ttl::Unbounded,
        ))
        .unwrap();

    let cache = CacheManager::new(store);
    let value = cache
        .get_or_compute(&key("garbled"), CachePolicy::default(), || {
            Ok::<_, ()>(vec![1u64])
        })
        .unwrap();
    assert_eq!(*value, vec![1]);
}

#[test]
fn test_disk_store_survives_restart() {
    let temp = TempDir::new().unwrap();

    {
        let cache = CacheManager::new(Arc::new(DiskStore::open(temp.path()).unwrap()));
        cache
            .get_or_compute(&key("disk"), CachePolicy::default(), || {
                Ok::<_, ()>(vec!["/a".to_string(), "/a/b".to_string()])
            })
            .unwrap();
    }

    let cache = CacheManager::new(Arc::new(DiskStore::open(temp.path()).unwrap()));
    let value = cache
        .get_or_compute(&key("disk"), CachePolicy::default(), || {
            Ok::<_, ()>(Vec::<String>::new())
        })
        .unwrap();
    assert_eq!(*value, vec!["/a".to_string(), "/a/b".to_string()]);
    assert_eq!(cache.stats().store_hits, 1);
}

#[test]
fn test_clear_empties_both_tiers() {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheManager::new(store.clone());
    for name in ["a", "b", "c"] {
        cache
            .get_or_compute(&key(name), CachePolicy::default(), || Ok::<_, ()>(0u64))
            .unwrap();
    }
    assert_eq!(store.len(), 3);

    cache.clear();
    assert_eq!(cache.memory_len(), 0);
    assert!(store.is_empty());
}

#[test]
fn test_hit_rate() {
    let cache = CacheManager::in_memory();
    assert_eq!(cache.stats().hit_rate(), 0.0);
    for _ in 0..4 {
        cache
            .get_or_compute(&key("h"), CachePolicy::default(), || Ok::<_, ()>(1u64))
            .unwrap();
    }
    assert!((cache.stats().hit_rate() - 0.75).abs() < f64::EPSILON);
}
