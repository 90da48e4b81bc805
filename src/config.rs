//! Crate-level configuration.
//!
//! Layered the way the teacher crate layers `velesdb.toml`: runtime override
//! > environment variable (`VECTORCORE_*`) > config file > built-in default.
//! This supplies *defaults*; the per-call [`crate::containers::Params`] bag
//! (spec §6) always takes precedence over anything loaded here.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration source could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A loaded value failed validation.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Default HNSW construction/search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Max neighbours per node at level 0 (`M`).
    pub max_neighbor_count: usize,
    /// Max neighbours per node above level 0 (`M/2`).
    pub upper_neighbor_count: usize,
    /// Beam width used while inserting.
    pub ef_construction: usize,
    /// Beam width used while searching.
    pub ef: usize,
    /// Level-generator scaling factor (`1/ln(M)` in the classic formulation).
    pub scaling_factor: f64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_neighbor_count: 32,
            upper_neighbor_count: 16,
            ef_construction: 200,
            ef: 64,
            scaling_factor: 1.0 / (32f64).ln(),
        }
    }
}

/// Default buffer-pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Bytes per cached block.
    pub block_size: usize,
    /// Total bytes of resident buffers.
    pub pool_capacity: usize,
    /// Acquire retries before surfacing `ReadData`.
    pub retry: usize,
    /// Number of sharded eviction queues.
    pub shard_count: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            block_size: 16 * 1024,
            pool_capacity: 64 * 1024 * 1024,
            retry: 5,
            shard_count: 8,
        }
    }
}

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorCoreConfig {
    /// HNSW defaults.
    pub hnsw: HnswConfig,
    /// Buffer pool defaults.
    pub buffer_pool: BufferPoolConfig,
}

impl VectorCoreConfig {
    /// Loads configuration from an optional TOML file, overridable by
    /// `VECTORCORE_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the file or environment cannot be
    /// deserialized into a valid `VectorCoreConfig`.
    pub fn load(toml_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = toml_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("VECTORCORE_").split("__"));
        let config: Self = figment.extract().map_err(|e| ConfigError::Parse(e.to_string()))?;
        tracing::debug!(?toml_path, pool_capacity = config.buffer_pool.pool_capacity, "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = VectorCoreConfig::default();
        assert!(cfg.hnsw.upper_neighbor_count <= cfg.hnsw.max_neighbor_count);
        assert!(cfg.buffer_pool.retry > 0);
        assert!(cfg.buffer_pool.shard_count > 0);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = VectorCoreConfig::load(None).unwrap();
        assert_eq!(cfg.hnsw.ef, 64);
        assert_eq!(cfg.buffer_pool.block_size, 16 * 1024);
    }
}
