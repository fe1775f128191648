//! Configuration management for HashLedger

use crate::error::{LedgerError, Result};
use crate::miner::MAX_WORKERS;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "hashledger.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Reject seals whose proof fails verification against the last block.
    #[serde(default = "default_verify_proofs")]
    pub verify_proofs: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            verify_proofs: default_verify_proofs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Load the config at `path`, using defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };

    // Validate critical values
    if config.miner.workers == 0 || config.miner.workers > MAX_WORKERS {
        return Err(LedgerError::Config(format!(
            "miner.workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.miner.workers
        )));
    }

    if config.logging.level.trim().is_empty() {
        return Err(LedgerError::Config("logging.level must not be empty".to_string()));
    }

    Ok(config)
}

fn default_verify_proofs() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}
