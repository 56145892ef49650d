//! Hardlink deduplication.

use dashmap::DashSet;

/// Identity of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub inode: u64,
    pub device: u64,
}

impl FileIdentity {
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }
}

/// Remembers which files have been counted so hardlinks add size once.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: DashSet<FileIdentity>,
}

impl InodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file. Returns `true` the first time it is seen.
    pub fn track(&self, identity: FileIdentity) -> bool {
        self.seen.insert(identity)
    }

    /// Number of distinct files recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_once() {
        let tracker = InodeTracker::new();
        let id = FileIdentity::new(12345, 1);

        assert!(tracker.track(id));
        assert!(!tracker.track(id));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_same_inode_other_device() {
        let tracker = InodeTracker::new();
        assert!(tracker.track(FileIdentity::new(12345, 1)));
        assert!(tracker.track(FileIdentity::new(12345, 2)));
    }
}
