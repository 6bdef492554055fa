use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub grant: GrantConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// "memory" or "sqlite".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Regular allowance re-check cadence.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// How far past a nearing expiry the re-check lands.
    #[serde(default = "default_expiry_slack")]
    pub expiry_slack_ms: u64,
    #[serde(default = "default_badge_tick")]
    pub badge_tick_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GrantConfig {
    /// Durations the grant surfaces offer, in minutes.
    #[serde(default = "default_grant_choices")]
    pub choices_min: Vec<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_backend() -> String {
    "memory".to_string()
}
fn default_sqlite_path() -> String {
    "sitegate.db".to_string()
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_poll_secs() -> u64 {
    20
}
fn default_expiry_slack() -> u64 {
    100
}
fn default_badge_tick() -> u64 {
    1
}
fn default_grant_choices() -> Vec<u32> {
    vec![5, 15, 30]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            sweep: SweepConfig::default(),
            watch: WatchConfig::default(),
            grant: GrantConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            expiry_slack_ms: default_expiry_slack(),
            badge_tick_secs: default_badge_tick(),
        }
    }
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            choices_min: default_grant_choices(),
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

impl GrantConfig {
    /// Whether `minutes` is one of the durations surfaces offer. The engine
    /// accepts any positive duration; this is for UI-side validation.
    pub fn is_choice(&self, minutes: u32) -> bool {
        self.choices_min.contains(&minutes)
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}
