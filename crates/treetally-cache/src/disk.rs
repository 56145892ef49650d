//! File-backed persistent cache store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::CacheError;
use crate::store::{CacheStore, StoredEntry};

const ENTRY_EXTENSION: &str = "json";

/// Stores each entry as one JSON file named by the BLAKE3 digest of its key.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Default location under the user cache directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("treetally"))
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove entries whose own TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut removed = 0;

        for path in self.entry_files()? {
            let expired = match read_entry(&path) {
                Ok(entry) => entry.is_expired(now),
                // Unreadable entries are dropped too
                Err(_) => true,
            };
            if expired {
                remove_file(&path)?;
                removed += 1;
            }
        }

        tracing::debug!(removed, dir = %self.dir.display(), "purged expired cache entries");
        Ok(removed)
    }

    /// Number of entries on disk.
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entry_files()?.len())
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes());
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", digest.to_hex()))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CacheError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl CacheStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let entry: StoredEntry =
                    serde_json::from_str(&content).map_err(|e| CacheError::Corrupt {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                // Digest collision or a renamed file
                if entry.key != key {
                    return Ok(None);
                }
                Ok(Some(entry))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    fn put(&self, entry: StoredEntry) -> Result<(), CacheError> {
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension("tmp");
        let content = serde_json::to_string(&entry).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;

        fs::write(&tmp, content).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        remove_file(&self.path_for(key))
    }

    fn clear(&self) -> Result<(), CacheError> {
        for path in self.entry_files()? {
            remove_file(&path)?;
        }
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<StoredEntry, CacheError> {
    let content = fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| CacheError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn remove_file(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Ttl;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::open(temp.path()).unwrap();

        store
            .put(StoredEntry::new("levels:abc", "[1,2]".to_string(), Ttl::Seconds(60)))
            .unwrap();
        let entry = store.get("levels:abc").unwrap().unwrap();
        assert_eq!(entry.payload, "[1,2]");
        assert_eq!(store.len().unwrap(), 1);

        store.delete("levels:abc").unwrap();
        assert!(store.get("levels:abc").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_error() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::open(temp.path()).unwrap();
        fs::write(store.path_for("bad"), "not json").unwrap();

        assert!(matches!(store.get("bad"), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_purge_expired() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::open(temp.path()).unwrap();

        let mut stale = StoredEntry::new("old", "1".to_string(), Ttl::Seconds(1));
        stale.created_at = Utc::now() - chrono::Duration::seconds(10);
        store.put(stale).unwrap();
        store
            .put(StoredEntry::new("fresh", "2".to_string(), Ttl::Unbounded))
            .unwrap();

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(store.get("old").unwrap().is_none());
        assert!(store.get("fresh").unwrap().is_some());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::open(temp.path()).unwrap();
        for i in 0..3 {
            store
                .put(StoredEntry::new(format!("k{i}"), "0".to_string(), Ttl::Unbounded))
                .unwrap();
        }
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }
}
