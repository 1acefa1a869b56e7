//! Configuration management for bpmchain
//!
//! Values come from `config.toml` (or the file named by `BPMCHAIN_CONFIG`),
//! fall back to defaults when the file is absent, and are then overridden by
//! the environment: `ADDR` (streaming port), `PORT` (HTTP port) and
//! `BPMCHAIN_DIFFICULTY`.

use crate::blockchain::{ChainParams, HashAlgorithm};
use crate::consensus::ForkChoice;
use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Seconds between snapshot pushes on streaming connections.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    /// Longest line a streaming client may send, newline excluded. Longer lines are dropped.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Leading zero hex characters required per block; 0 disables proof-of-work.
    #[serde(default)]
    pub difficulty: u32,
    #[serde(default)]
    pub digest: HashAlgorithm,
    #[serde(default)]
    pub fork_choice: ForkChoice,
    /// Abort a single mining search after this many seconds; 0 means no deadline.
    #[serde(default)]
    pub mining_timeout_secs: u64,
    /// How many times a producer rebuilds its block after losing a race for the tip.
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            tcp_port: default_tcp_port(),
            api_port: default_api_port(),
            snapshot_interval_secs: default_snapshot_interval(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: 0,
            digest: HashAlgorithm::default(),
            fork_choice: ForkChoice::default(),
            mining_timeout_secs: 0,
            max_append_retries: default_max_append_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NetworkConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.tcp_port)
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.api_port)
    }
}

impl ChainConfig {
    pub fn params(&self) -> ChainParams {
        ChainParams::new(self.digest, self.difficulty)
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        (self.mining_timeout_secs > 0).then(|| Duration::from_secs(self.mining_timeout_secs))
    }
}

impl Config {
    /// Check values that would make the node unusable.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.snapshot_interval_secs == 0 {
            return Err(ChainError::ConfigError(
                "network.snapshot_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.network.max_line_bytes == 0 {
            return Err(ChainError::ConfigError(
                "network.max_line_bytes must be greater than 0".to_string(),
            ));
        }
        if self.network.bind_address.trim().is_empty() {
            return Err(ChainError::ConfigError("network.bind_address must be set".to_string()));
        }
        let max = self.chain.digest.hex_len();
        if self.chain.difficulty as usize > max {
            return Err(ChainError::ConfigError(format!(
                "chain.difficulty {} exceeds the {} hex characters of a {} digest",
                self.chain.difficulty, max, self.chain.digest
            )));
        }
        Ok(())
    }

    /// Apply `ADDR`, `PORT` and `BPMCHAIN_DIFFICULTY` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ChainError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ChainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ADDR") {
            self.network.tcp_port = parse_env("ADDR", &addr)?;
        }
        if let Some(port) = lookup("PORT") {
            self.network.api_port = parse_env("PORT", &port)?;
        }
        if let Some(difficulty) = lookup("BPMCHAIN_DIFFICULTY") {
            self.chain.difficulty = parse_env("BPMCHAIN_DIFFICULTY", &difficulty)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ChainError>
where
    T::Err: std::fmt::Display,
{
    // ADDR may be given as ":9000" the way listeners are usually written.
    let trimmed = value.trim().trim_start_matches(':');
    trimmed
        .parse()
        .map_err(|e| ChainError::ConfigError(format!("{} has invalid value {:?}: {}", key, value, e)))
}

/// Parse a config file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ChainError> {
    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)?
    };
    Ok(config)
}

/// Load, apply environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config, ChainError> {
    let env_path = std::env::var("BPMCHAIN_CONFIG").ok();
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env_path.map(Into::into))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());

    let mut config = load_config_from(&path)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_tcp_port() -> u16 {
    9000
}

fn default_api_port() -> u16 {
    8080
}

fn default_snapshot_interval() -> u64 {
    30
}

fn default_max_line_bytes() -> usize {
    crate::network::DEFAULT_MAX_LINE_BYTES
}

fn default_max_append_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}
