//! Row sources feeding the planner.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use treetally_core::{PathRow, QueryError, RawRow};

use crate::sample::{bernoulli, sampling_rng};

/// A tabular source of path rows.
///
/// Implementations wrap whatever engine holds the table. The planner only
/// asks for a row count, windows of rows in a stable order, and Bernoulli
/// samples pushed down to the engine.
pub trait RowSource: Send + Sync {
    /// Identifies the table contents; changes whenever the rows change.
    fn fingerprint(&self) -> String;

    /// Estimated number of rows, `None` when the engine cannot tell.
    fn row_count(&self) -> Result<Option<u64>, QueryError>;

    /// Up to `limit` rows starting at `offset`, in a stable order.
    fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<PathRow>, QueryError>;

    /// Each row independently with probability `fraction`.
    fn sample(&self, fraction: f64, seed: Option<u64>) -> Result<Vec<PathRow>, QueryError>;
}

/// An in-memory table.
#[derive(Debug, Clone)]
pub struct MemorySource {
    rows: Vec<PathRow>,
    fingerprint: String,
    count_known: bool,
}

impl MemorySource {
    /// Wrap rows; the fingerprint is a BLAKE3 digest of their contents.
    pub fn new(rows: Vec<PathRow>) -> Self {
        let fingerprint = fingerprint_rows(&rows);
        Self {
            rows,
            fingerprint,
            count_known: true,
        }
    }

    /// Make `row_count` report `None`, as engines without statistics do.
    pub fn without_row_count(mut self) -> Self {
        self.count_known = false;
        self
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[PathRow] {
        &self.rows
    }

    /// Number of rows held.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take the rows back.
    pub fn into_rows(self) -> Vec<PathRow> {
        self.rows
    }
}

impl RowSource for MemorySource {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn row_count(&self) -> Result<Option<u64>, QueryError> {
        Ok(self.count_known.then_some(self.rows.len() as u64))
    }

    fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<PathRow>, QueryError> {
        let len = self.rows.len();
        let start = usize::try_from(offset).unwrap_or(len).min(len);
        let end = usize::try_from(limit)
            .map_or(len, |limit| start.saturating_add(limit))
            .min(len);
        Ok(self.rows[start..end].to_vec())
    }

    fn sample(&self, fraction: f64, seed: Option<u64>) -> Result<Vec<PathRow>, QueryError> {
        Ok(bernoulli(&self.rows, fraction, &mut sampling_rng(seed)))
    }
}

fn fingerprint_rows(rows: &[PathRow]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(rows.len() as u64).to_le_bytes());
    for row in rows {
        hasher.update(&(row.raw_path.len() as u64).to_le_bytes());
        hasher.update(row.raw_path.as_bytes());
        hasher.update(&row.size.to_le_bytes());
        hasher.update(&row.count_hint.unwrap_or(u64::MAX).to_le_bytes());
        hasher.update(
            &row.modified
                .map_or(i64::MIN, |m| m.timestamp_millis())
                .to_le_bytes(),
        );
    }
    hasher.finalize().to_hex()[..32].to_string()
}

/// Read a JSON-lines table, one [`RawRow`] object per line.
///
/// Missing, negative or non-numeric fields fall back to defaults; a line
/// that is not a JSON object is an error. Blank lines are skipped.
pub fn read_json_lines(path: &Path) -> Result<MemorySource, QueryError> {
    let io_err = |source: std::io::Error| QueryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRow = serde_json::from_str(&line).map_err(|e| QueryError::Malformed {
            path: path.to_path_buf(),
            line: index + 1,
            message: e.to_string(),
        })?;
        rows.push(PathRow::from(raw));
    }

    tracing::debug!(rows = rows.len(), path = %path.display(), "loaded JSON-lines table");
    Ok(MemorySource::new(rows))
}

/// Write rows as JSON lines.
pub fn write_json_lines<W: Write>(rows: &[PathRow], mut writer: W) -> std::io::Result<()> {
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
