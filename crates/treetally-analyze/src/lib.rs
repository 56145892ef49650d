//! Hierarchical folder analytics for treetally.
//!
//! This crate turns a flat table of path rows into per-depth folder
//! aggregates and keeps that fast as tables grow:
//!
//! - **Level aggregation** - Sum a metric at every prefix depth
//! - **Query planning** - Direct, sampled or batched execution by table size
//! - **Cached reports** - Memoize aggregates per request and source
//!
//! # Level Aggregation
//!
//! ```rust
//! use treetally_analyze::{LevelRequest, Metric, aggregate_by_level, top_by_metric};
//! use treetally_core::{AnalyticsConfig, PathField, PathRow};
//!
//! let rows = vec![
//!     PathRow::new("/a/b/c/file1", 10),
//!     PathRow::new("/a/b/d/file2", 20),
//!     PathRow::new("/a/e/file3", 5),
//! ];
//! let request = LevelRequest::new(Metric::Size).with_path_field(PathField::Parent);
//! let result = aggregate_by_level(&rows, &request, &AnalyticsConfig::default());
//!
//! assert_eq!(result.find("/a").unwrap().aggregated_metric, 35);
//! assert_eq!(top_by_metric(result.level(2), 1)[0].prefix_path, "/a/b");
//! ```
//!
//! # Cached Reports
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use treetally_analyze::{FolderReport, LevelRequest, ReportOptions, read_json_lines};
//! use treetally_cache::CacheManager;
//!
//! let source = read_json_lines("table.jsonl".as_ref())?;
//! let report = FolderReport::new(config, Arc::new(CacheManager::in_memory()));
//! let levels = report.levels(&source, &LevelRequest::default(), ReportOptions::default(), &cancel)?;
//! ```

pub mod levels;
pub mod planner;
mod progress;
mod report;
pub mod sample;
mod source;

pub use levels::{
    CountSource, LevelAccumulator, LevelRequest, Metric, aggregate_by_level, top_by_metric,
};
pub use planner::{ExecutionStrategy, Precision, QueryPlanner, ScaleTier};
pub use progress::BatchProgress;
pub use report::{FolderReport, ReportError, ReportOptions, ScaleReport, paginate};
pub use source::{MemorySource, RowSource, read_json_lines, write_json_lines};

// Re-export core types
pub use treetally_core::{AggregationResult, Completeness, HierarchyLevel, LevelSummary};
