//! Path decomposition into depth-indexed hierarchy segments.
//!
//! Paths are split on `/`. Leading, trailing and repeated separators never
//! produce empty segments, so malformed input degrades to a shorter (possibly
//! empty) segment sequence instead of an error.
//!
//! Prefix paths are rendered rooted: the depth-2 prefix of `a/b/c` is `/a/b`.

use compact_str::CompactString;

use crate::row::{PathField, PathRow};

/// Separator between hierarchy segments.
pub const SEPARATOR: char = '/';

/// Iterate the non-empty segments of a path without allocating.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|segment| !segment.is_empty())
}

/// Split a path into its ordered, non-empty segments.
pub fn decompose(path: &str) -> Vec<CompactString> {
    segments(path).map(CompactString::from).collect()
}

/// Number of segments in a path.
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Normalize a path to its rooted form (`"/a/b"`, or `"/"` when empty).
pub fn normalize(path: &str) -> String {
    join_rooted(segments(path))
}

/// Rooted prefix formed by the first `depth` segments.
pub fn prefix<S: AsRef<str>>(segments: &[S], depth: usize) -> String {
    join_rooted(segments.iter().take(depth).map(AsRef::as_ref))
}

/// Segments of the folder containing `path` (everything but the last segment).
pub fn parent_segments(path: &str) -> Vec<CompactString> {
    let mut parts = decompose(path);
    parts.pop();
    parts
}

/// Maximum segment count across a batch of rows; 0 for an empty batch.
pub fn max_depth<'a>(rows: impl IntoIterator<Item = &'a PathRow>) -> usize {
    max_depth_by(rows, PathField::Path)
}

/// Maximum segment count across a batch, measured on the given path field.
pub fn max_depth_by<'a>(rows: impl IntoIterator<Item = &'a PathRow>, field: PathField) -> usize {
    rows.into_iter()
        .map(|row| {
            let full = depth(&row.raw_path);
            match field {
                PathField::Path => full,
                PathField::Parent => full.saturating_sub(1),
            }
        })
        .max()
        .unwrap_or(0)
}

fn join_rooted<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut joined = String::from("/");
    for (i, part) in parts.enumerate() {
        if i > 0 {
            joined.push(SEPARATOR);
        }
        joined.push_str(part);
    }
    joined
}
