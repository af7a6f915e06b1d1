//! Configuration for Tessera query pipelines.
//!
//! Provides [`TesseraConfig`], loaded from TOML files, environment variables,
//! and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit config path argument
//! 2. `TESSERA_CONFIG` environment variable
//! 3. XDG default: `~/.config/tessera/config.toml`
//! 4. Built-in defaults
//!
//! `TESSERA_<SECTION>_<KEY>` environment variables overlay file values.

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

// ============================================================================
// Configuration structs
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Embedding cache settings.
    pub cache: CacheConfig,

    /// Query defaults.
    pub query: QueryConfig,

    /// Reranker defaults.
    pub rerank: RerankConfig,
}

/// Embedding cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a computed embedding stays valid.
    pub ttl_secs: u64,
}

/// Defaults applied to new query builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Result limit when the caller does not set one.
    pub default_limit: usize,

    /// Whether filters run before the index scan by default.
    pub prefilter: bool,

    /// Vector column searched when the caller does not name one.
    pub vector_column: String,

    /// Default IVF partitions probed per vector search.
    pub nprobes: Option<usize>,
}

/// Reranker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// RRF smoothing constant.
    pub rrf_k: u32,

    /// Vector weight for the linear-combination reranker.
    pub linear_weight: f32,

    /// Normalised score assumed for a side that did not return a row.
    pub linear_fill: f32,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            prefilter: true,
            vector_column: "vector".to_string(),
            nprobes: None,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            linear_weight: 0.7,
            linear_fill: 1.0,
        }
    }
}

impl CacheConfig {
    /// The TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl TesseraConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                log::debug!("loading config from {}", path.display());
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("TESSERA");
        env_opts.add_section("cache");
        env_opts.add_section("query");
        env_opts.add_section("rerank");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from explicit argument, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("TESSERA_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tessera").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Reject values the query pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.query.default_limit == 0 {
            return Err(Error::config("query.default_limit must be greater than 0"));
        }
        if self.rerank.rrf_k == 0 {
            return Err(Error::config("rerank.rrf_k must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.rerank.linear_weight) {
            return Err(Error::config("rerank.linear_weight must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.rerank.linear_fill) {
            return Err(Error::config("rerank.linear_fill must be within [0, 1]"));
        }
        if self.query.vector_column.is_empty() {
            return Err(Error::config("query.vector_column must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
