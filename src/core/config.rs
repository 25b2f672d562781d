//! Configuration parsing and validation.
//!
//! Warden configuration is loaded from TOML files by the embedding service.
//! Durations are expressed as integral milliseconds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level warden configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Subject expiry lifecycle configuration.
    #[serde(default)]
    pub expiry: ExpiryConfig,
}

/// Subject expiry lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// How long overdue announcements and deletions are tolerated past the
    /// subject's expiry, in milliseconds.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Acknowledgement aggregation deadline and delete-confirmation timeout,
    /// in milliseconds.
    #[serde(default = "default_persistence_timeout_ms")]
    pub persistence_timeout_ms: u64,

    /// Announcement retry backoff.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Randomized exponential backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial backoff in milliseconds.
    #[serde(default = "default_backoff_min_ms")]
    pub min_ms: u64,

    /// Upper bound on backoff in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,

    /// Non-negative jitter amplitude.
    #[serde(default = "default_backoff_random_factor")]
    pub random_factor: f64,
}

fn default_grace_period_ms() -> u64 {
    4 * 60 * 60 * 1000 // 4 hours
}

fn default_persistence_timeout_ms() -> u64 {
    60_000
}

fn default_backoff_min_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

fn default_backoff_random_factor() -> f64 {
    1.0
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            persistence_timeout_ms: default_persistence_timeout_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_ms: default_backoff_min_ms(),
            max_ms: default_backoff_max_ms(),
            random_factor: default_backoff_random_factor(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.expiry.validate()
    }
}

impl ExpiryConfig {
    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Persistence timeout as a duration.
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    /// Validate the expiry configuration.
    pub fn validate(&self) -> Result<()> {
        if self.persistence_timeout_ms == 0 {
            anyhow::bail!("expiry.persistence_timeout_ms must be > 0");
        }
        self.backoff.validate()
    }
}

impl BackoffConfig {
    /// Initial backoff as a duration.
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    /// Maximum backoff as a duration.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Validate the backoff configuration.
    pub fn validate(&self) -> Result<()> {
        if self.min_ms == 0 {
            anyhow::bail!("expiry.backoff.min_ms must be > 0");
        }
        if self.max_ms < self.min_ms {
            anyhow::bail!("expiry.backoff.max_ms must be >= min_ms");
        }
        if self.random_factor < 0.0 || !self.random_factor.is_finite() {
            anyhow::bail!("expiry.backoff.random_factor must be a non-negative number");
        }
        Ok(())
    }
}
