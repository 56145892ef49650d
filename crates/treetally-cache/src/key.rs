//! Deterministic cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key identifying one memoized computation.
///
/// Keys built from the same namespace and the same parts in the same order
/// are always equal, so logically identical requests share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key in a namespace such as `"levels"`.
    pub fn builder(namespace: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            namespace: namespace.to_string(),
            hasher: blake3::Hasher::new(),
        }
    }

    /// Use a caller-provided string verbatim.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace prefix of a built key.
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(ns, _)| ns)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates named parts into a BLAKE3 digest.
pub struct CacheKeyBuilder {
    namespace: String,
    hasher: blake3::Hasher,
}

impl CacheKeyBuilder {
    /// Add a named part.
    pub fn part(mut self, name: &str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for field in [name.as_bytes(), value.as_bytes()] {
            self.hasher.update(&(field.len() as u64).to_le_bytes());
            self.hasher.update(field);
        }
        self
    }

    /// Add an optional part; `None` hashes as a distinct marker.
    pub fn optional_part<T: fmt::Display>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.part(name, format_args!("some:{v}")),
            None => self.part(name, "none"),
        }
    }

    /// Finish the key.
    pub fn build(self) -> CacheKey {
        let digest = self.hasher.finalize();
        CacheKey(format!("{}:{}", self.namespace, &digest.to_hex()[..32]))
    }
}
