//! Directory scanning for treetally.
//!
//! Walks a directory tree in parallel with jwalk and flattens it into the
//! path table the analytics layer consumes: one [`PathRow`] per regular
//! file, carrying its `/`-separated path, size and modification time.
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Progress updates** via broadcast channels
//! - **Hardlink detection** so linked files are counted once
//! - **Ignore globs** pruned before descent
//!
//! # Example
//!
//! ```rust,no_run
//! use treetally_scan::{JwalkScanner, ScanConfig};
//!
//! let config = ScanConfig::new("/path/to/scan");
//! let table = JwalkScanner::new().scan(&config).unwrap();
//!
//! println!("{} files, {} bytes", table.stats.files, table.stats.total_size);
//! ```

mod config;
mod error;
mod inode;
mod progress;
mod scanner;

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use inode::{FileIdentity, InodeTracker};
pub use progress::{ScanProgress, ScanStats};
pub use scanner::{JwalkScanner, ScannedTable};

pub use treetally_core::PathRow;
