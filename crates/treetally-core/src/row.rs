//! Input rows of the flat path table.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path;

/// One record of the flat file-system table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRow {
    /// Full path of the object, `/`-separated.
    pub raw_path: CompactString,

    /// Size in bytes.
    pub size: u64,

    /// Pre-aggregated item count carried by upstream tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_hint: Option<u64>,

    /// Last modification time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl PathRow {
    /// Create a row with a path and size.
    pub fn new(raw_path: impl Into<CompactString>, size: u64) -> Self {
        Self {
            raw_path: raw_path.into(),
            size,
            count_hint: None,
            modified: None,
        }
    }

    /// Attach a pre-aggregated count.
    pub fn with_count_hint(mut self, count: u64) -> Self {
        self.count_hint = Some(count);
        self
    }

    /// Attach a modification time.
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Segments of the chosen path field.
    pub fn segments(&self, field: PathField) -> Vec<CompactString> {
        match field {
            PathField::Path => path::decompose(&self.raw_path),
            PathField::Parent => path::parent_segments(&self.raw_path),
        }
    }
}

/// Which path of a row drives the hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathField {
    /// The object's own path; leaves are the objects themselves.
    #[default]
    Path,
    /// The containing folder; leaves are the deepest folders.
    Parent,
}

impl PathField {
    /// Stable name used in cache keys and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            PathField::Path => "path",
            PathField::Parent => "parent",
        }
    }
}

/// Loosely-typed row as read from external tables.
///
/// Every field is optional and loosely typed; conversion into [`PathRow`]
/// fills the gaps with safe defaults so dirty data never aborts a report.
/// Path columns are kept apart and resolved in order: `path`, then
/// `rawPath`, then `parentPath`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default, rename = "rawPath", alias = "raw_path")]
    pub raw_path: Option<String>,

    #[serde(default, rename = "parentPath", alias = "parent_path")]
    pub parent_path: Option<String>,

    /// Any JSON value; non-numbers read as 0.
    #[serde(default)]
    pub size: Option<Value>,

    #[serde(default)]
    pub count: Option<Value>,

    #[serde(default, rename = "countHint", alias = "count_hint")]
    pub count_hint: Option<Value>,

    #[serde(default, alias = "updatedAt")]
    pub modified: Option<Value>,
}

/// Read a loosely-typed number as a non-negative integer.
///
/// Floats are rounded, negatives clamp to 0, and anything that is not a
/// number reads as 0.
fn lenient_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(v), _) => v,
            (None, Some(f)) if f.is_finite() && f > 0.0 => f.round().min(u64::MAX as f64) as u64,
            _ => 0,
        },
        _ => 0,
    }
}

impl From<RawRow> for PathRow {
    fn from(raw: RawRow) -> Self {
        let raw_path = raw.path.or(raw.raw_path).or(raw.parent_path);
        Self {
            raw_path: raw_path.map(CompactString::from).unwrap_or_default(),
            size: raw.size.as_ref().map_or(0, lenient_u64),
            count_hint: raw.count.or(raw.count_hint).as_ref().map(lenient_u64),
            modified: raw
                .modified
                .and_then(|m| serde_json::from_value::<DateTime<Utc>>(m).ok()),
        }
    }
}
