//! Hierarchy level records and aggregation results.

use serde::{Deserialize, Serialize};

use crate::config::SamplingMethod;

/// Aggregate for one folder prefix at one depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    /// Depth of the prefix, starting at 1.
    pub depth: usize,
    /// Rooted prefix path, e.g. `/a/b`.
    pub prefix_path: String,
    /// Metric summed over every row under this prefix.
    pub aggregated_metric: u64,
    /// Number of items under this prefix.
    pub item_count: u64,
    /// Share of `aggregated_metric` from rows that end exactly at this prefix.
    pub own_metric: u64,
}

impl HierarchyLevel {
    /// Last segment of the prefix path.
    pub fn name(&self) -> &str {
        self.prefix_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.prefix_path)
    }

    /// Check whether `other` is a direct child of this record.
    pub fn is_parent_of(&self, other: &HierarchyLevel) -> bool {
        other.depth == self.depth + 1
            && other
                .prefix_path
                .strip_prefix(self.prefix_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// All records of a single depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGroup {
    /// Depth shared by every record.
    pub depth: usize,
    /// Records in first-seen order.
    pub records: Vec<HierarchyLevel>,
}

/// How much of the source a result reflects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Completeness {
    /// Every row was aggregated.
    Exact,
    /// Aggregated over a random sample; values are approximate.
    Sampled {
        /// Fraction of the source the sample was drawn with.
        fraction: f64,
        /// How the sample was drawn.
        method: SamplingMethod,
    },
    /// Batched run stopped early; only the first batches are included.
    Partial {
        /// Batches folded in before cancellation.
        batches_completed: u64,
        /// Set when the cancelled run was also drawing a sample.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sampling: Option<SamplingMethod>,
    },
}

impl Completeness {
    /// Check whether values are exact over the whole source.
    pub fn is_exact(&self) -> bool {
        matches!(self, Completeness::Exact)
    }

    /// Check whether the result came from a cancelled run.
    pub fn is_partial(&self) -> bool {
        matches!(self, Completeness::Partial { .. })
    }

    /// Check whether values come from a sample, cancelled or not.
    pub fn is_sampled(&self) -> bool {
        matches!(
            self,
            Completeness::Sampled { .. }
                | Completeness::Partial {
                    sampling: Some(_),
                    ..
                }
        )
    }
}

/// Per-depth aggregates for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Levels in ascending depth order.
    pub levels: Vec<LevelGroup>,
    /// Deepest segment count seen in the input, before any depth limit.
    pub max_depth_observed: usize,
    /// Number of rows folded into the result.
    pub rows_processed: u64,
    /// Exact, sampled or partial.
    pub completeness: Completeness,
}

impl AggregationResult {
    /// Result for an empty input.
    pub fn empty() -> Self {
        Self {
            levels: Vec::new(),
            max_depth_observed: 0,
            rows_processed: 0,
            completeness: Completeness::Exact,
        }
    }

    /// Check whether there is no data (not an error).
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of depths with records.
    pub fn depth_count(&self) -> usize {
        self.levels.len()
    }

    /// Records at a depth; empty when the depth was not reached.
    pub fn level(&self, depth: usize) -> &[HierarchyLevel] {
        self.levels
            .iter()
            .find(|group| group.depth == depth)
            .map(|group| group.records.as_slice())
            .unwrap_or(&[])
    }

    /// All records, depth-ascending.
    pub fn records(&self) -> impl Iterator<Item = &HierarchyLevel> {
        self.levels.iter().flat_map(|group| group.records.iter())
    }

    /// Look up a record by its rooted prefix path.
    pub fn find(&self, prefix_path: &str) -> Option<&HierarchyLevel> {
        self.records().find(|record| record.prefix_path == prefix_path)
    }

    /// Direct children of a record.
    pub fn children<'a>(
        &'a self,
        parent: &'a HierarchyLevel,
    ) -> impl Iterator<Item = &'a HierarchyLevel> + 'a {
        self.level(parent.depth + 1)
            .iter()
            .filter(move |child| parent.is_parent_of(child))
    }

    /// Total metric across the top level.
    pub fn total_metric(&self) -> u64 {
        self.level(1).iter().map(|r| r.aggregated_metric).sum()
    }
}

/// Summary statistics over the records of one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub records: usize,
    pub total_metric: u64,
    pub mean_metric: f64,
    pub median_metric: f64,
    pub max_metric: u64,
    pub total_count: u64,
    pub mean_count: f64,
    pub median_count: f64,
    pub max_count: u64,
}

impl LevelSummary {
    /// Summarize a slice of records; all zeros for an empty slice.
    pub fn from_records(records: &[HierarchyLevel]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let metrics: Vec<u64> = records.iter().map(|r| r.aggregated_metric).collect();
        let counts: Vec<u64> = records.iter().map(|r| r.item_count).collect();
        let total_metric: u64 = metrics.iter().sum();
        let total_count: u64 = counts.iter().sum();
        let n = records.len() as f64;

        Self {
            records: records.len(),
            total_metric,
            mean_metric: total_metric as f64 / n,
            median_metric: median(metrics.clone()),
            max_metric: metrics.iter().copied().max().unwrap_or(0),
            total_count,
            mean_count: total_count as f64 / n,
            median_count: median(counts.clone()),
            max_count: counts.iter().copied().max().unwrap_or(0),
        }
    }
}

fn median(mut values: Vec<u64>) -> f64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    } else {
        values[mid] as f64
    }
}
