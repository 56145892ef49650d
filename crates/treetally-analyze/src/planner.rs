//! Scale-adaptive query planning.
//!
//! The planner looks at how many rows a source holds and picks a strategy
//! that keeps latency bounded:
//!
//! - **Direct**: small tables are fetched whole and aggregated exactly.
//! - **Sampled**: large tables are sampled down to roughly
//!   `sample_size` rows when an approximate answer is acceptable.
//! - **Batched**: large tables are streamed in `batch_size` windows and
//!   folded into one accumulator when the answer must be exact.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use treetally_core::{AggregationResult, AnalyticsConfig, Completeness, QueryError, SamplingMethod};

use crate::levels::{LevelAccumulator, LevelRequest};
use crate::progress::{BatchProgress, ProgressTracker};
use crate::sample::Reservoir;
use crate::source::RowSource;

/// Whether a caller accepts approximate results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Every row must be counted.
    Exact,
    /// Sampling is acceptable above the threshold.
    #[default]
    Approximate,
}

/// How a query will be executed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Fetch every row and aggregate once.
    Direct,
    /// Aggregate a random sample of about `target` rows.
    Sampled {
        fraction: f64,
        target: u64,
        method: SamplingMethod,
    },
    /// Stream fixed-size windows into one accumulator.
    Batched { batch_size: u64 },
}

impl ExecutionStrategy {
    /// Stable description used in cache keys and logs.
    pub fn describe(&self) -> String {
        match self {
            ExecutionStrategy::Direct => "direct".to_string(),
            ExecutionStrategy::Sampled {
                fraction,
                target,
                method,
            } => format!("sampled:{}:{target}:{fraction}", method.as_str()),
            ExecutionStrategy::Batched { batch_size } => format!("batched:{batch_size}"),
        }
    }

    /// Check whether results are approximate.
    pub fn is_sampled(&self) -> bool {
        matches!(self, ExecutionStrategy::Sampled { .. })
    }
}

/// Coarse size class of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleTier {
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl ScaleTier {
    /// Classify a row count.
    pub fn from_row_count(rows: u64) -> Self {
        match rows {
            0..10_000 => ScaleTier::Small,
            10_000..1_000_000 => ScaleTier::Medium,
            1_000_000..10_000_000 => ScaleTier::Large,
            _ => ScaleTier::VeryLarge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleTier::Small => "small",
            ScaleTier::Medium => "medium",
            ScaleTier::Large => "large",
            ScaleTier::VeryLarge => "very_large",
        }
    }

    /// Operational advice for this tier.
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            ScaleTier::Small => &[],
            ScaleTier::Medium => &[
                "Paginate list views",
                "Keep the aggregate cache enabled",
            ],
            ScaleTier::Large => &[
                "Use approximate precision for interactive views",
                "Limit hierarchy depth for overview reports",
                "Keep the persistent cache enabled across runs",
            ],
            ScaleTier::VeryLarge => &[
                "Use approximate precision for every interactive view",
                "Precompute exact aggregates in batched runs and serve them from cache",
                "Split the table by top-level folder before exact analysis",
            ],
        }
    }
}

/// Picks and runs execution strategies for level aggregation.
#[derive(Debug)]
pub struct QueryPlanner {
    config: AnalyticsConfig,
    progress_tx: broadcast::Sender<BatchProgress>,
}

impl QueryPlanner {
    /// Create a planner with the given thresholds.
    pub fn new(config: AnalyticsConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            progress_tx,
        }
    }

    /// Subscribe to per-batch progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchProgress> {
        self.progress_tx.subscribe()
    }

    /// Configuration in use.
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Choose a strategy for a table of `estimated_rows` rows.
    pub fn plan(&self, estimated_rows: Option<u64>, precision: Precision) -> ExecutionStrategy {
        let config = &self.config;

        let Some(rows) = estimated_rows else {
            // No estimate to derive a fraction from: stream into a fixed-size reservoir.
            warn!(
                target_rows = config.fallback_sample_size,
                "row count unavailable, falling back to reservoir sample"
            );
            return ExecutionStrategy::Sampled {
                fraction: 1.0,
                target: config.fallback_sample_size,
                method: SamplingMethod::Reservoir,
            };
        };

        if rows <= config.sample_threshold {
            return ExecutionStrategy::Direct;
        }

        match precision {
            Precision::Exact => ExecutionStrategy::Batched {
                batch_size: config.batch_size,
            },
            Precision::Approximate => ExecutionStrategy::Sampled {
                fraction: (config.sample_size as f64 / rows as f64).min(1.0),
                target: config.sample_size,
                method: config.sampling,
            },
        }
    }

    /// Estimate the row count, plan, and run.
    pub fn execute(
        &self,
        source: &dyn RowSource,
        request: &LevelRequest,
        precision: Precision,
        cancel: &CancellationToken,
    ) -> Result<AggregationResult, QueryError> {
        let estimated_rows = source.row_count()?;
        let strategy = self.plan(estimated_rows, precision);
        self.execute_plan(source, request, strategy, estimated_rows, cancel)
    }

    /// Run an already chosen strategy.
    pub fn execute_plan(
        &self,
        source: &dyn RowSource,
        request: &LevelRequest,
        strategy: ExecutionStrategy,
        estimated_rows: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<AggregationResult, QueryError> {
        info!(
            strategy = %strategy.describe(),
            estimated_rows = ?estimated_rows,
            metric = request.metric.as_str(),
            "executing level aggregation"
        );

        match strategy {
            ExecutionStrategy::Direct => {
                // Sources may cap their page size, so keep reading until drained.
                let mut accumulator = LevelAccumulator::new(*request, &self.config);
                let mut offset = 0u64;
                loop {
                    let rows = source.fetch(offset, u64::MAX)?;
                    if rows.is_empty() {
                        break;
                    }
                    offset += rows.len() as u64;
                    accumulator.absorb(&rows);
                    if drained(offset, estimated_rows) {
                        break;
                    }
                }
                Ok(accumulator.finish(Completeness::Exact))
            }
            ExecutionStrategy::Sampled {
                fraction,
                method: SamplingMethod::Bernoulli,
                ..
            } => {
                let rows = source.sample(fraction, self.config.sample_seed)?;
                debug!(sampled = rows.len(), fraction, "bernoulli sample drawn");
                let mut accumulator = LevelAccumulator::new(*request, &self.config);
                accumulator.absorb(&rows);
                Ok(accumulator.finish(Completeness::Sampled {
                    fraction,
                    method: SamplingMethod::Bernoulli,
                }))
            }
            ExecutionStrategy::Sampled {
                target,
                method: SamplingMethod::Reservoir,
                ..
            } => self.run_reservoir(source, request, target, estimated_rows, cancel),
            ExecutionStrategy::Batched { batch_size } => {
                self.run_batched(source, request, batch_size, estimated_rows, cancel)
            }
        }
    }

    fn run_batched(
        &self,
        source: &dyn RowSource,
        request: &LevelRequest,
        batch_size: u64,
        estimated_rows: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<AggregationResult, QueryError> {
        let batch_size = batch_size.max(1);
        let mut accumulator = LevelAccumulator::new(*request, &self.config);
        let mut tracker = ProgressTracker::new(estimated_rows);
        let mut offset = 0u64;

        loop {
            if cancel.is_cancelled() {
                let batches_completed = tracker.batches_completed();
                warn!(batches_completed, "batched aggregation cancelled, returning partial result");
                return Ok(accumulator.finish(Completeness::Partial {
                    batches_completed,
                    sampling: None,
                }));
            }

            let rows = source.fetch(offset, batch_size)?;
            if rows.is_empty() {
                break;
            }

            accumulator.absorb(&rows);
            tracker.record_batch(rows.len());
            offset += rows.len() as u64;

            let snapshot = tracker.snapshot();
            debug!(
                batches = snapshot.batches_completed,
                rows = snapshot.rows_processed,
                "batch folded"
            );
            let _ = self.progress_tx.send(snapshot);

            if drained(offset, estimated_rows) {
                break;
            }
        }

        Ok(accumulator.finish(Completeness::Exact))
    }

    fn run_reservoir(
        &self,
        source: &dyn RowSource,
        request: &LevelRequest,
        target: u64,
        estimated_rows: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<AggregationResult, QueryError> {
        let batch_size = self.config.batch_size.max(1);
        let capacity = usize::try_from(target).unwrap_or(usize::MAX);
        let mut reservoir = Reservoir::new(capacity, self.config.sample_seed);
        let mut tracker = ProgressTracker::new(estimated_rows);
        let mut offset = 0u64;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let rows = source.fetch(offset, batch_size)?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len();
            offset += fetched as u64;
            reservoir.extend(rows);
            tracker.record_batch(fetched);
            let _ = self.progress_tx.send(tracker.snapshot());

            if drained(offset, estimated_rows) {
                break;
            }
        }

        let seen = reservoir.seen();
        let sample = reservoir.into_items();
        let mut accumulator = LevelAccumulator::new(*request, &self.config);
        accumulator.absorb(&sample);

        let completeness = if cancelled {
            let batches_completed = tracker.batches_completed();
            warn!(batches_completed, "reservoir sampling cancelled, returning partial result");
            Completeness::Partial {
                batches_completed,
                sampling: Some(SamplingMethod::Reservoir),
            }
        } else {
            let fraction = if seen == 0 {
                1.0
            } else {
                sample.len() as f64 / seen as f64
            };
            debug!(sampled = sample.len(), seen, "reservoir sample drawn");
            Completeness::Sampled {
                fraction,
                method: SamplingMethod::Reservoir,
            }
        };

        Ok(accumulator.finish(completeness))
    }
}

/// A short page is not the end of a source; only an empty page or reaching
/// the known row count is.
fn drained(offset: u64, estimated_rows: Option<u64>) -> bool {
    estimated_rows.is_some_and(|rows| offset >= rows)
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> QueryPlanner {
        QueryPlanner::default()
    }

    #[test]
    fn test_small_tables_run_direct() {
        assert_eq!(planner().plan(Some(50_000), Precision::Approximate), ExecutionStrategy::Direct);
        assert_eq!(planner().plan(Some(100_000), Precision::Exact), ExecutionStrategy::Direct);
    }

    #[test]
    fn test_large_approximate_is_sampled() {
        match planner().plan(Some(10_000_000), Precision::Approximate) {
            ExecutionStrategy::Sampled {
                fraction,
                target,
                method,
            } => {
                assert!((fraction - 0.01).abs() < 1e-12);
                assert_eq!(target, 100_000);
                assert_eq!(method, SamplingMethod::Bernoulli);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_large_exact_is_batched() {
        assert_eq!(
            planner().plan(Some(2_000_000), Precision::Exact),
            ExecutionStrategy::Batched { batch_size: 500_000 }
        );
    }

    #[test]
    fn test_unknown_count_falls_back() {
        assert_eq!(
            planner().plan(None, Precision::Exact),
            ExecutionStrategy::Sampled {
                fraction: 1.0,
                target: 10_000,
                method: SamplingMethod::Reservoir,
            }
        );
    }

    #[test]
    fn test_drained_needs_known_count() {
        assert!(!drained(100, None));
        assert!(!drained(100, Some(1_000)));
        assert!(drained(1_000, Some(1_000)));
    }

    #[test]
    fn test_scale_tiers() {
        assert_eq!(ScaleTier::from_row_count(0), ScaleTier::Small);
        assert_eq!(ScaleTier::from_row_count(9_999), ScaleTier::Small);
        assert_eq!(ScaleTier::from_row_count(10_000), ScaleTier::Medium);
        assert_eq!(ScaleTier::from_row_count(1_000_000), ScaleTier::Large);
        assert_eq!(ScaleTier::from_row_count(10_000_000), ScaleTier::VeryLarge);
        assert!(ScaleTier::Small.recommendations().is_empty());
        assert!(!ScaleTier::VeryLarge.recommendations().is_empty());
    }

    #[test]
    fn test_strategy_descriptions_differ() {
        let a = ExecutionStrategy::Batched { batch_size: 10 }.describe();
        let b = ExecutionStrategy::Batched { batch_size: 20 }.describe();
        assert_ne!(a, b);
        assert_eq!(ExecutionStrategy::Direct.describe(), "direct");
    }
}
