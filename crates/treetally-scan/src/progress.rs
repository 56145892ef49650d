//! Scan progress reporting.

use std::time::{Duration, Instant};

/// Progress snapshot broadcast during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Rows (files) emitted so far.
    pub files_scanned: u64,
    /// Directories visited so far.
    pub dirs_scanned: u64,
    /// Bytes counted so far.
    pub bytes_scanned: u64,
    /// Warnings recorded so far.
    pub warnings_count: u64,
    /// Time since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Running scan counters with timing.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    files_scanned: u64,
    dirs_scanned: u64,
    symlinks_seen: u64,
    bytes_scanned: u64,
    warnings_count: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_scanned: 0,
            dirs_scanned: 0,
            symlinks_seen: 0,
            bytes_scanned: 0,
            warnings_count: 0,
        }
    }

    pub fn record_file(&mut self, size: u64) {
        self.files_scanned += 1;
        self.bytes_scanned += size;
    }

    pub fn record_dir(&mut self) {
        self.dirs_scanned += 1;
    }

    pub fn record_symlink(&mut self) {
        self.symlinks_seen += 1;
    }

    pub fn record_warning(&mut self) {
        self.warnings_count += 1;
    }

    pub fn files_scanned(&self) -> u64 {
        self.files_scanned
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            files_scanned: self.files_scanned,
            dirs_scanned: self.dirs_scanned,
            bytes_scanned: self.bytes_scanned,
            warnings_count: self.warnings_count,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            files: self.files_scanned,
            dirs: self.dirs_scanned,
            symlinks: self.symlinks_seen,
            total_size: self.bytes_scanned,
        }
    }
}

/// Totals for a finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub total_size: u64,
}
