//! Persistent cache store abstraction.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Time-to-live of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// Entry expires this many seconds after creation.
    Seconds(u64),
    /// Entry never expires on its own.
    Unbounded,
}

impl Ttl {
    /// Check whether an entry created at `created_at` has expired at `now`.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Ttl::Unbounded => false,
            // A TTL too large to represent never expires.
            Ttl::Seconds(secs) => i64::try_from(*secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|ttl| created_at.checked_add_signed(ttl))
                .is_some_and(|expiry| now >= expiry),
        }
    }
}

impl From<Option<u64>> for Ttl {
    fn from(secs: Option<u64>) -> Self {
        secs.map_or(Ttl::Unbounded, Ttl::Seconds)
    }
}

/// One persisted cache entry; the payload is an opaque JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Ttl,
}

impl StoredEntry {
    /// Create an entry stamped with the current time.
    pub fn new(key: impl Into<String>, payload: String, ttl: Ttl) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: Utc::now(),
            ttl,
        }
    }

    /// Check expiry against the entry's own TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl.is_expired(self.created_at, now)
    }
}

/// Key-value store backing the persistent cache tier.
pub trait CacheStore: Send + Sync {
    /// Fetch an entry; `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    /// Insert or replace an entry.
    fn put(&self, entry: StoredEntry) -> Result<(), CacheError>;

    /// Remove an entry; absent keys are not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry.
    fn clear(&self) -> Result<(), CacheError>;
}

/// In-process store, useful when no disk location is configured and for
/// sharing a "persistent" tier between manager instances in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn put(&self, entry: StoredEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}
