//! Core types for treetally.
//!
//! This crate provides the data structures shared by the treetally
//! workspace: path rows and their decomposition into hierarchy segments,
//! per-depth aggregate records, page windows, and configuration.

mod config;
mod error;
mod level;
mod page;
pub mod path;
mod row;

pub use config::{AnalyticsConfig, AnalyticsConfigBuilder, SamplingMethod};
pub use error::{ConfigError, QueryError};
pub use level::{AggregationResult, Completeness, HierarchyLevel, LevelGroup, LevelSummary};
pub use page::{Page, PageWindow};
pub use row::{PathField, PathRow, RawRow};
