//! Per-depth aggregation of path rows.
//!
//! Every row contributes to each prefix of its path: a row at `/a/b/c`
//! adds its metric to `/a` (depth 1), `/a/b` (depth 2) and `/a/b/c`
//! (depth 3). Depths are independent of each other, so each depth's map
//! is folded on its own rayon task.

use compact_str::CompactString;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use treetally_core::{
    AggregationResult, AnalyticsConfig, Completeness, HierarchyLevel, LevelGroup, PathField,
    PathRow, path,
};

/// Quantity summed at each level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sum of row sizes in bytes.
    #[default]
    Size,
    /// Number of items, as chosen by the [`CountSource`].
    Count,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Size => "size",
            Metric::Count => "count",
        }
    }
}

/// How a row contributes to item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    /// Every row counts as one item.
    #[default]
    Rows,
    /// Rows carry a pre-aggregated count; rows without one count as one.
    Hint,
}

impl CountSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountSource::Rows => "rows",
            CountSource::Hint => "hint",
        }
    }
}

/// What to aggregate and how deep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelRequest {
    pub metric: Metric,
    pub count_source: CountSource,
    pub path_field: PathField,
    /// Deepest level to emit; `None` means as deep as the data goes.
    pub max_depth: Option<usize>,
}

impl LevelRequest {
    /// Request for a metric with default grouping.
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    pub fn with_count_source(mut self, count_source: CountSource) -> Self {
        self.count_source = count_source;
        self
    }

    pub fn with_path_field(mut self, path_field: PathField) -> Self {
        self.path_field = path_field;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Depth ceiling from the request and the configured hard limit.
    pub fn depth_ceiling(&self, config: &AnalyticsConfig) -> usize {
        self.max_depth
            .unwrap_or(usize::MAX)
            .min(config.max_hierarchy_depth)
    }

    fn item_count(&self, row: &PathRow) -> u64 {
        match self.count_source {
            CountSource::Rows => 1,
            CountSource::Hint => row.count_hint.unwrap_or(1),
        }
    }

    fn metric_value(&self, row: &PathRow) -> u64 {
        match self.metric {
            Metric::Size => row.size,
            Metric::Count => self.item_count(row),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    metric: u64,
    count: u64,
    own: u64,
}

/// A row reduced to what aggregation needs.
struct Contribution {
    segments: Vec<CompactString>,
    metric: u64,
    count: u64,
}

/// Running per-depth totals, fed one batch at a time.
///
/// Feeding all rows in one call and feeding them in consecutive batches
/// produce identical results, including record order.
#[derive(Debug)]
pub struct LevelAccumulator {
    request: LevelRequest,
    ceiling: usize,
    levels: Vec<IndexMap<String, Tally>>,
    max_depth_observed: usize,
    rows_processed: u64,
}

impl LevelAccumulator {
    /// Create an empty accumulator.
    pub fn new(request: LevelRequest, config: &AnalyticsConfig) -> Self {
        Self {
            request,
            ceiling: request.depth_ceiling(config),
            levels: Vec::new(),
            max_depth_observed: 0,
            rows_processed: 0,
        }
    }

    /// Fold a batch of rows into the running totals.
    pub fn absorb(&mut self, rows: &[PathRow]) {
        let request = self.request;
        let contributions: Vec<Contribution> = rows
            .par_iter()
            .map(|row| Contribution {
                segments: row.segments(request.path_field),
                metric: request.metric_value(row),
                count: request.item_count(row),
            })
            .collect();

        let batch_depth = contributions
            .iter()
            .map(|c| c.segments.len())
            .max()
            .unwrap_or(0);

        self.rows_processed += rows.len() as u64;
        self.max_depth_observed = self.max_depth_observed.max(batch_depth);

        let limit = batch_depth.min(self.ceiling);
        if self.levels.len() < limit {
            self.levels.resize_with(limit, IndexMap::new);
        }

        self.levels
            .par_iter_mut()
            .enumerate()
            .take(limit)
            .for_each(|(index, groups)| fold_depth(groups, index + 1, &contributions));
    }

    /// Rows absorbed so far.
    pub fn rows_processed(&self) -> u64 {
        self.rows_processed
    }

    /// Deepest segment count seen so far.
    pub fn max_depth_observed(&self) -> usize {
        self.max_depth_observed
    }

    /// Number of prefixes tracked across all depths.
    pub fn record_count(&self) -> usize {
        self.levels.iter().map(IndexMap::len).sum()
    }

    /// Produce the result, tagged with how complete the input was.
    pub fn finish(self, completeness: Completeness) -> AggregationResult {
        let levels = self
            .levels
            .into_iter()
            .enumerate()
            .filter(|(_, groups)| !groups.is_empty())
            .map(|(index, groups)| {
                let depth = index + 1;
                LevelGroup {
                    depth,
                    records: groups
                        .into_iter()
                        .map(|(prefix_path, tally)| HierarchyLevel {
                            depth,
                            prefix_path,
                            aggregated_metric: tally.metric,
                            item_count: tally.count,
                            own_metric: tally.own,
                        })
                        .collect(),
                }
            })
            .collect();

        AggregationResult {
            levels,
            max_depth_observed: self.max_depth_observed,
            rows_processed: self.rows_processed,
            completeness,
        }
    }
}

fn fold_depth(groups: &mut IndexMap<String, Tally>, depth: usize, contributions: &[Contribution]) {
    for contribution in contributions {
        let len = contribution.segments.len();
        if len < depth {
            continue;
        }
        let tally = groups
            .entry(path::prefix(&contribution.segments, depth))
            .or_default();
        tally.metric = tally.metric.saturating_add(contribution.metric);
        tally.count = tally.count.saturating_add(contribution.count);
        if len == depth {
            tally.own = tally.own.saturating_add(contribution.metric);
        }
    }
}

/// Aggregate a complete row set in one pass.
pub fn aggregate_by_level(
    rows: &[PathRow],
    request: &LevelRequest,
    config: &AnalyticsConfig,
) -> AggregationResult {
    let mut accumulator = LevelAccumulator::new(*request, config);
    accumulator.absorb(rows);
    accumulator.finish(Completeness::Exact)
}

/// The `n` records with the largest metric, ties broken by prefix path.
pub fn top_by_metric(records: &[HierarchyLevel], n: usize) -> Vec<HierarchyLevel> {
    let mut sorted: Vec<&HierarchyLevel> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.aggregated_metric
            .cmp(&a.aggregated_metric)
            .then_with(|| a.prefix_path.cmp(&b.prefix_path))
    });
    sorted.into_iter().take(n).cloned().collect()
}
