//! Engine configuration.
//!
//! ```rust
//! use aliasdb::config::{Config, JoinStrategy};
//!
//! let config = Config::from_json(r#"{ "join": { "strategy": "hash" } }"#).unwrap();
//! assert_eq!(config.join.strategy, JoinStrategy::Hash);
//! assert_eq!(config.scan_batch_size, 256);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration, shared by every session of a `KVEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage entries fetched per engine lock acquisition during a scan.
    /// Default: 256
    pub scan_batch_size: usize,

    /// Join execution settings.
    pub join: JoinConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_batch_size: 256,
            join: JoinConfig::default(),
        }
    }
}

impl Config {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(Error::Config("scan_batch_size must be at least 1".into()));
        }
        if self.join.block_size == 0 {
            return Err(Error::Config("join.block_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Join execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub strategy: JoinStrategy,

    /// Outer records buffered per inner rescan for `BlockNestedLoop`.
    /// Default: 64
    pub block_size: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            strategy: JoinStrategy::default(),
            block_size: 64,
        }
    }
}

/// Physical join algorithm.
///
/// Every strategy emits matches in outer-row-major order with exact
/// multiplicity; they differ only in how often the inner table is scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Rescan the inner table once per outer record.
    #[default]
    NestedLoop,
    /// Rescan the inner table once per block of outer records.
    BlockNestedLoop,
    /// Scan the inner table once into a hash table keyed on the join column.
    Hash,
}
