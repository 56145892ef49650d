//! Cache store errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a persistent cache store.
///
/// The cache manager never surfaces these to callers: a failed read is a
/// miss and a failed write is logged.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored entry could not be decoded.
    #[error("Corrupt cache entry {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// A value could not be encoded for storage.
    #[error("Failed to serialize cache value: {message}")]
    Serialization { message: String },

    /// The store is unavailable for another reason.
    #[error("Cache store unavailable: {message}")]
    Unavailable { message: String },
}

impl CacheError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
