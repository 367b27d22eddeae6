//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/scancatch.sqlite"
//!
//! [server]
//! port = 5000
//! ack_message = "Request recorded"
//!
//! [feed]
//! capacity = 100
//! seed = 50
//! mailbox = 256
//!
//! [delivery]
//! strategies = ["native", "structured", "delayed"]
//! max_retries = 5
//! backoff_base_ms = 100
//! backoff_cap_ms = 1000
//! settle_delay_ms = 200
//! background_timeout_ms = 2000
//! manual_fallback = true
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scancatch_core::backoff::Backoff;

use crate::delivery::StrategyKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ack_message")]
    pub ack_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            ack_message: default_ack_message(),
        }
    }
}

fn default_port() -> u16 {
    5000
}
fn default_ack_message() -> String {
    "Request recorded".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_seed")]
    pub seed: usize,
    #[serde(default = "default_mailbox")]
    pub mailbox: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            seed: default_seed(),
            mailbox: default_mailbox(),
        }
    }
}

fn default_capacity() -> usize {
    100
}
fn default_seed() -> usize {
    50
}
fn default_mailbox() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_background_timeout_ms")]
    pub background_timeout_ms: u64,
    #[serde(default = "default_manual_fallback")]
    pub manual_fallback: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            background_timeout_ms: default_background_timeout_ms(),
            manual_fallback: default_manual_fallback(),
        }
    }
}

fn default_strategies() -> Vec<StrategyKind> {
    StrategyKind::PRIMARY.to_vec()
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    100
}
fn default_backoff_cap_ms() -> u64 {
    1000
}
fn default_settle_delay_ms() -> u64 {
    200
}
fn default_background_timeout_ms() -> u64 {
    2000
}
fn default_manual_fallback() -> bool {
    true
}

impl DeliveryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.backoff_base_ms),
            cap: Duration::from_millis(self.backoff_cap_ms),
            max_attempts: self.max_retries,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_millis(self.background_timeout_ms)
    }
}

impl Config {
    /// Defaults with the database under `./data`, for commands that can run
    /// without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/scancatch.sqlite"),
            },
            server: ServerConfig::default(),
            feed: FeedConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be in 1..=65535");
        }
        if self.feed.capacity == 0 {
            anyhow::bail!("feed.capacity must be > 0");
        }
        if self.feed.seed > self.feed.capacity {
            anyhow::bail!(
                "feed.seed ({}) must not exceed feed.capacity ({})",
                self.feed.seed,
                self.feed.capacity
            );
        }
        if self.feed.mailbox == 0 {
            anyhow::bail!("feed.mailbox must be > 0");
        }
        if self.delivery.strategies.is_empty() {
            anyhow::bail!("delivery.strategies must list at least one strategy");
        }
        if self.delivery.max_retries == 0 {
            anyhow::bail!("delivery.max_retries must be >= 1");
        }
        if self.delivery.backoff_base_ms > self.delivery.backoff_cap_ms {
            anyhow::bail!("delivery.backoff_base_ms must not exceed delivery.backoff_cap_ms");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
