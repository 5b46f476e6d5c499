//! Configuration management for powledger

use crate::error::ChainError;
use crate::ledger::pow::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero hex nibbles a proof-of-work digest must have.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_agents")]
    pub agents: usize,
    /// Nonces drawn between checks of the stop signal and the chain height.
    #[serde(default = "default_nonce_batch")]
    pub nonce_batch: u32,
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Where the generated fixture file is written; `None` keeps it in memory.
    #[serde(default = "default_fixture_path")]
    pub fixture_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub expected_chain_length: Option<usize>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            nonce_batch: default_nonce_batch(),
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixture_path: default_fixture_path(),
            timeout_secs: default_timeout_secs(),
            expected_chain_length: None,
        }
    }
}

impl MinerConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

impl SimulationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::ConfigError(format!(
                "ledger.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.ledger.difficulty
            )));
        }
        if self.miner.agents == 0 {
            return Err(ChainError::ConfigError(
                "miner.agents must be at least 1".to_string(),
            ));
        }
        if self.miner.nonce_batch == 0 {
            return Err(ChainError::ConfigError(
                "miner.nonce_batch must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(path)?;
    Config::from_toml(&config_str)
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_agents() -> usize {
    10
}

fn default_nonce_batch() -> u32 {
    1024
}

fn default_idle_wait_ms() -> u64 {
    50
}

fn default_fixture_path() -> Option<PathBuf> {
    Some(PathBuf::from("genesis_transaction_file.json"))
}

fn default_timeout_secs() -> u64 {
    120
}
