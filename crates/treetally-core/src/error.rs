//! Error types shared across treetally crates.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a row source.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The underlying engine rejected or failed the query.
    #[error("Query failed: {message}")]
    Source { message: String },

    /// Reading the table failed.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A table could not be parsed.
    #[error("Malformed table {path} at line {line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl QueryError {
    /// Create a source error from any message.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
