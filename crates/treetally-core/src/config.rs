//! Analytics configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a sampled strategy draws its rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    /// Independent inclusion per row; sample size is approximate.
    #[default]
    Bernoulli,
    /// Algorithm R over streamed batches; sample size is exact.
    Reservoir,
}

impl SamplingMethod {
    /// Stable name used in cache keys and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingMethod::Bernoulli => "bernoulli",
            SamplingMethod::Reservoir => "reservoir",
        }
    }
}

/// Thresholds and sizes for the aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Row count above which queries stop running directly.
    #[builder(default = "100_000")]
    pub sample_threshold: u64,

    /// Target number of rows for sampled queries.
    #[builder(default = "100_000")]
    pub sample_size: u64,

    /// Sample size used when the row count is unknown.
    #[builder(default = "10_000")]
    pub fallback_sample_size: u64,

    /// Rows per batch for exact aggregation of large sources.
    #[builder(default = "500_000")]
    pub batch_size: u64,

    /// Time-to-live for persisted aggregates (0 = never expires).
    #[builder(default = "3600")]
    pub cache_ttl_seconds: u64,

    /// Hard ceiling on hierarchy depth.
    #[builder(default = "64")]
    pub max_hierarchy_depth: usize,

    /// Default page size for list views.
    #[builder(default = "100")]
    pub page_size: u64,

    /// Entries kept in the in-process aggregate cache.
    #[builder(default = "256")]
    pub memory_cache_entries: u64,

    /// Sampling method for sampled strategies.
    #[builder(default)]
    pub sampling: SamplingMethod,

    /// Fixed RNG seed for reproducible samples (None = random).
    #[builder(default)]
    pub sample_seed: Option<u64>,
}

impl AnalyticsConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("Batch size must be greater than zero".to_string());
        }
        if self.sample_size == Some(0) {
            return Err("Sample size must be greater than zero".to_string());
        }
        if self.max_hierarchy_depth == Some(0) {
            return Err("Maximum hierarchy depth must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            sample_threshold: 100_000,
            sample_size: 100_000,
            fallback_sample_size: 10_000,
            batch_size: 500_000,
            cache_ttl_seconds: 3600,
            max_hierarchy_depth: 64,
            page_size: 100,
            memory_cache_entries: 256,
            sampling: SamplingMethod::Bernoulli,
            sample_seed: None,
        }
    }
}

impl AnalyticsConfig {
    /// Create a new config builder.
    pub fn builder() -> AnalyticsConfigBuilder {
        AnalyticsConfigBuilder::default()
    }

    /// Default config file location (`<config dir>/treetally/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("treetally").join("config.toml"))
    }

    /// Load from a TOML file. Keys left out take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    /// Validate values that the builder would reject.
    pub fn check(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            message: message.to_string(),
        };
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be greater than zero"));
        }
        if self.sample_size == 0 {
            return Err(invalid("sample_size must be greater than zero"));
        }
        if self.max_hierarchy_depth == 0 {
            return Err(invalid("max_hierarchy_depth must be greater than zero"));
        }
        Ok(())
    }

    /// Cache TTL, `None` when entries never expire.
    pub fn cache_ttl(&self) -> Option<u64> {
        (self.cache_ttl_seconds > 0).then_some(self.cache_ttl_seconds)
    }
}
