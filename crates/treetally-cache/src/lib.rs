//! Memoization layer for treetally query results.
//!
//! A [`CacheManager`] keeps computed values in memory and optionally mirrors
//! them into a [`CacheStore`] so they survive restarts. Values are addressed
//! by a [`CacheKey`] derived from every parameter that affects the result.

mod disk;
mod error;
mod key;
mod manager;
mod store;

pub use disk::DiskStore;
pub use error::CacheError;
pub use key::{CacheKey, CacheKeyBuilder};
pub use manager::{CacheManager, CachePolicy, CacheStats, DEFAULT_MEMORY_CAPACITY};
pub use store::{CacheStore, MemoryStore, StoredEntry, Ttl};
