//! JWalk-based parallel directory scanner.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use jwalk::{Parallelism, WalkDir};
use tokio::sync::broadcast;
use tracing::{debug, info};

use treetally_core::PathRow;

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanWarning, WarningKind};
use crate::inode::{FileIdentity, InodeTracker};
use crate::progress::{ProgressTracker, ScanProgress, ScanStats};

const PROGRESS_INTERVAL: u64 = 1000;

/// Flat table produced by a scan.
#[derive(Debug, Clone)]
pub struct ScannedTable {
    /// Canonical root that was scanned.
    pub root: PathBuf,
    /// One row per regular file.
    pub rows: Vec<PathRow>,
    pub stats: ScanStats,
    pub warnings: Vec<ScanWarning>,
    pub duration: Duration,
}

impl ScannedTable {
    /// Take the rows.
    pub fn into_rows(self) -> Vec<PathRow> {
        self.rows
    }
}

/// Parallel scanner using jwalk for traversal.
pub struct JwalkScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl JwalkScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Walk the configured root and emit one row per regular file.
    pub fn scan(&self, config: &ScanConfig) -> Result<ScannedTable, ScanError> {
        let start = Instant::now();
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&config.root, e))?;

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }

        let root_metadata =
            std::fs::metadata(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
        let root_device = get_dev(&root_metadata);
        let matcher = config.ignore_matcher()?;

        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        // Ignored entries are pruned before descent so their subtrees are never read.
        let walker = WalkDir::new(&root_path)
            .parallelism(parallelism)
            .sort(true)
            .skip_hidden(!config.include_hidden)
            .follow_links(config.follow_symlinks)
            .min_depth(0)
            .max_depth(config.max_depth.map_or(usize::MAX, |d| d as usize))
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|entry| {
                    entry
                        .as_ref()
                        .map_or(true, |e| !matcher.is_match(e.file_name()))
                });
            });

        let base = config.relative_paths.then_some(root_path.as_path());
        let inode_tracker = InodeTracker::new();
        let mut tracker = ProgressTracker::new();
        let mut rows = Vec::new();
        let mut warnings = Vec::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warnings.push(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                    tracker.record_warning();
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                tracker.record_symlink();
                if !path.exists() {
                    let target = std::fs::read_link(&path)
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default();
                    warnings.push(ScanWarning::broken_symlink(&path, &target));
                    tracker.record_warning();
                }
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    warnings.push(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    tracker.record_warning();
                    continue;
                }
            };

            if !config.cross_filesystems && get_dev(&metadata) != root_device {
                continue;
            }

            if file_type.is_dir() {
                tracker.record_dir();
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let size = if config.apparent_size
                || get_nlink(&metadata) <= 1
                || inode_tracker.track(FileIdentity::new(get_ino(&metadata), get_dev(&metadata)))
            {
                metadata.len()
            } else {
                // Later hardlink of an already counted file
                0
            };

            let mut row = PathRow::new(row_path(&path, base), size);
            if let Ok(modified) = metadata.modified() {
                row = row.with_modified(DateTime::<Utc>::from(modified));
            }
            rows.push(row);
            tracker.record_file(size);

            if tracker.files_scanned() % PROGRESS_INTERVAL == 0 {
                let _ = self.progress_tx.send(tracker.snapshot());
            }
        }

        let duration = start.elapsed();
        let stats = tracker.stats();
        info!(
            root = %root_path.display(),
            files = stats.files,
            dirs = stats.dirs,
            warnings = warnings.len(),
            elapsed_ms = duration.as_millis() as u64,
            "scan complete"
        );
        debug!(hardlinked = inode_tracker.len(), "hardlink identities tracked");

        Ok(ScannedTable {
            root: root_path,
            rows,
            stats,
            warnings,
            duration,
        })
    }
}

impl Default for JwalkScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a filesystem path as a rooted `/`-separated row path.
fn row_path(path: &Path, base: Option<&Path>) -> CompactString {
    let path = base
        .and_then(|base| path.strip_prefix(base).ok())
        .unwrap_or(path);

    let mut rendered = CompactString::default();
    for component in path.components() {
        let part = match component {
            Component::Normal(part) => part.to_string_lossy(),
            Component::Prefix(prefix) => prefix.as_os_str().to_string_lossy(),
            Component::RootDir | Component::CurDir | Component::ParentDir => continue,
        };
        rendered.push('/');
        rendered.push_str(&part);
    }
    if rendered.is_empty() {
        rendered.push('/');
    }
    rendered
}

#[cfg(unix)]
fn get_dev(metadata: &std::fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_ino(metadata: &std::fs::Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_nlink(metadata: &std::fs::Metadata) -> u64 {
    metadata.nlink()
}

#[cfg(not(unix))]
fn get_nlink(_metadata: &std::fs::Metadata) -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_path_absolute() {
        assert_eq!(row_path(Path::new("/home/u/a.txt"), None), "/home/u/a.txt");
    }

    #[test]
    fn test_row_path_relative() {
        let base = Path::new("/home/u");
        assert_eq!(row_path(Path::new("/home/u/src/lib.rs"), Some(base)), "/src/lib.rs");
        assert_eq!(row_path(base, Some(base)), "/");
    }
}
