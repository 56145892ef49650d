//! Cached folder reports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use treetally_cache::{CacheKey, CacheManager, CachePolicy, Ttl};
use treetally_core::{
    AggregationResult, AnalyticsConfig, HierarchyLevel, Page, PageWindow, PathRow, QueryError,
};

use crate::levels::{LevelRequest, top_by_metric};
use crate::planner::{ExecutionStrategy, Precision, QueryPlanner, ScaleTier};
use crate::source::RowSource;

/// Errors from report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The row source failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Depths start at 1.
    #[error("Invalid depth {depth}: depths start at 1")]
    InvalidDepth { depth: usize },
}

/// Per-call report settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub precision: Precision,
    /// Ignore cached results and recompute.
    pub force_refresh: bool,
}

impl ReportOptions {
    pub fn new(precision: Precision) -> Self {
        Self {
            precision,
            force_refresh: false,
        }
    }

    pub fn with_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

/// Size class of a source and the strategies it would get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleReport {
    pub row_count: Option<u64>,
    pub tier: Option<ScaleTier>,
    pub approximate_strategy: ExecutionStrategy,
    pub exact_strategy: ExecutionStrategy,
    pub recommendations: Vec<String>,
}

/// Outcomes that must not be memoized.
enum Uncached {
    Partial(AggregationResult),
    Failed(QueryError),
}

/// Level aggregation behind the cache.
///
/// Identical requests against an unchanged source are computed once and
/// then served from the cache until the TTL runs out. Partial results from
/// cancelled runs are returned but never stored.
#[derive(Debug)]
pub struct FolderReport {
    planner: QueryPlanner,
    cache: Arc<CacheManager>,
}

impl FolderReport {
    /// Create a report over a shared cache.
    pub fn new(config: AnalyticsConfig, cache: Arc<CacheManager>) -> Self {
        Self {
            planner: QueryPlanner::new(config),
            cache,
        }
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Cache key for a request against a source under a strategy.
    pub fn cache_key(
        &self,
        fingerprint: &str,
        request: &LevelRequest,
        strategy: &ExecutionStrategy,
    ) -> CacheKey {
        let config = self.planner.config();
        CacheKey::builder("levels")
            .part("source", fingerprint)
            .part("metric", request.metric.as_str())
            .part("count_source", request.count_source.as_str())
            .part("path_field", request.path_field.as_str())
            .optional_part("max_depth", request.max_depth)
            .part("depth_ceiling", config.max_hierarchy_depth)
            .part("strategy", strategy.describe())
            .optional_part("seed", config.sample_seed)
            .build()
    }

    /// Per-depth aggregates for a request.
    pub fn levels(
        &self,
        source: &dyn RowSource,
        request: &LevelRequest,
        options: ReportOptions,
        cancel: &CancellationToken,
    ) -> Result<Arc<AggregationResult>, ReportError> {
        let estimated_rows = source.row_count()?;
        let strategy = self.planner.plan(estimated_rows, options.precision);
        let key = self.cache_key(&source.fingerprint(), request, &strategy);
        let policy = CachePolicy::new(Ttl::from(self.planner.config().cache_ttl()))
            .with_refresh(options.force_refresh);

        let outcome = self.cache.get_or_compute(&key, policy, || {
            let result = self
                .planner
                .execute_plan(source, request, strategy, estimated_rows, cancel)
                .map_err(Uncached::Failed)?;
            if result.completeness.is_partial() {
                Err(Uncached::Partial(result))
            } else {
                Ok(result)
            }
        });

        match outcome {
            Ok(result) => Ok(result),
            Err(Uncached::Partial(result)) => {
                debug!(key = %key, "partial result not cached");
                Ok(Arc::new(result))
            }
            Err(Uncached::Failed(e)) => Err(e.into()),
        }
    }

    /// The `n` largest records at `depth`.
    pub fn top(
        &self,
        source: &dyn RowSource,
        request: &LevelRequest,
        depth: usize,
        n: usize,
        options: ReportOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<HierarchyLevel>, ReportError> {
        if depth == 0 {
            return Err(ReportError::InvalidDepth { depth });
        }
        let result = self.levels(source, request, options, cancel)?;
        Ok(top_by_metric(result.level(depth), n))
    }

    /// Classify the source and show which strategies it would get.
    pub fn scale(&self, source: &dyn RowSource) -> Result<ScaleReport, ReportError> {
        let row_count = source.row_count()?;
        let tier = row_count.map(ScaleTier::from_row_count);
        Ok(ScaleReport {
            row_count,
            tier,
            approximate_strategy: self.planner.plan(row_count, Precision::Approximate),
            exact_strategy: self.planner.plan(row_count, Precision::Exact),
            recommendations: tier
                .map(|t| t.recommendations().iter().map(|r| r.to_string()).collect())
                .unwrap_or_default(),
        })
    }
}

/// Fetch exactly one page of rows from a source.
///
/// When the source cannot report its size, all rows are read to find it.
pub fn paginate(
    source: &dyn RowSource,
    page_size: u64,
    page_number: u64,
) -> Result<Page<PathRow>, QueryError> {
    match source.row_count()? {
        Some(total) => {
            let window = PageWindow::for_page(total, page_size, page_number);
            let items = if window.is_empty() {
                Vec::new()
            } else {
                source.fetch(window.offset, window.limit())?
            };
            Ok(Page { window, items })
        }
        None => {
            let rows = source.fetch(0, u64::MAX)?;
            Ok(Page::from_items(&rows, page_size, page_number))
        }
    }
}
