//! Mapper configuration.
//!
//! Defaults match the limits of the stores this crate targets. A config can be
//! read from JSON:
//!
//! ```json
//! {
//!   "transaction_chunk_size": 10,
//!   "id_index_name": "objid-index",
//!   "default_page_size": 100
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the data manager and transaction batcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Maximum operations per atomic transaction chunk.
    #[serde(default = "default_chunk_size")]
    pub transaction_chunk_size: usize,
    /// Name of the secondary index keyed by object id.
    #[serde(default = "default_id_index_name")]
    pub id_index_name: String,
    /// Store page size when a `find` carries no limit.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Forces read consistency for every call, overriding schema defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistent_reads: Option<bool>,
}

fn default_chunk_size() -> usize {
    10
}

fn default_id_index_name() -> String {
    "objid-index".to_string()
}

fn default_page_size() -> usize {
    100
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            transaction_chunk_size: default_chunk_size(),
            id_index_name: default_id_index_name(),
            default_page_size: default_page_size(),
            consistent_reads: None,
        }
    }
}

impl MapperConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MapperConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transaction_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "transaction_chunk_size must be at least 1".into(),
            ));
        }
        if self.id_index_name.is_empty() {
            return Err(ConfigError::Invalid("id_index_name must not be empty".into()));
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid(
                "default_page_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.transaction_chunk_size = size;
        self
    }
}
