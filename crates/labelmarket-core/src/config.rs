//! Lease configuration.
//!
//! Loaded from a JSON file when one is given and exists. Otherwise the
//! environment provides the values, and anything unset falls back to the
//! defaults below:
//! - `LABELMARKET_DEFAULT_LEASE_MINUTES` (30)
//! - `LABELMARKET_MIN_LEASE_MINUTES` (5)
//! - `LABELMARKET_MAX_LEASE_MINUTES` (120)
//! - `LABELMARKET_SWEEP_BATCH_SIZE` (100)
//! - `LABELMARKET_REAPER_INTERVAL_SECS` (60)

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("{name} must be an unsigned integer, got {value:?}")]
    Env { name: &'static str, value: String },

    #[error("invalid lease config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Used when the caller does not ask for a specific duration.
    pub default_lease_minutes: u32,
    pub min_lease_minutes: u32,
    pub max_lease_minutes: u32,

    /// Expired leases reclaimed per page of a sweep.
    pub sweep_batch_size: usize,

    /// Period of the background reaper.
    pub reaper_interval_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_lease_minutes: 30,
            min_lease_minutes: 5,
            max_lease_minutes: 120,
            sweep_batch_size: 100,
            reaper_interval_secs: 60,
        }
    }
}

impl LeaseConfig {
    /// File if present, else environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => {
                let config = Self::from_file(path)?;
                tracing::info!("Loaded lease config from {}", path.display());
                config
            }
            Some(path) => {
                tracing::info!(
                    "No config file found at {}, using environment defaults",
                    path.display()
                );
                Self::from_env()?
            }
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            default_lease_minutes: parse_var(
                &lookup,
                "LABELMARKET_DEFAULT_LEASE_MINUTES",
                defaults.default_lease_minutes,
            )?,
            min_lease_minutes: parse_var(
                &lookup,
                "LABELMARKET_MIN_LEASE_MINUTES",
                defaults.min_lease_minutes,
            )?,
            max_lease_minutes: parse_var(
                &lookup,
                "LABELMARKET_MAX_LEASE_MINUTES",
                defaults.max_lease_minutes,
            )?,
            sweep_batch_size: parse_var(
                &lookup,
                "LABELMARKET_SWEEP_BATCH_SIZE",
                defaults.sweep_batch_size,
            )?,
            reaper_interval_secs: parse_var(
                &lookup,
                "LABELMARKET_REAPER_INTERVAL_SECS",
                defaults.reaper_interval_secs,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_lease_minutes == 0 {
            return Err(ConfigError::Invalid("min_lease_minutes must be at least 1".into()));
        }
        if !(self.min_lease_minutes..=self.max_lease_minutes).contains(&self.default_lease_minutes)
        {
            return Err(ConfigError::Invalid(format!(
                "default_lease_minutes {} outside [{}, {}]",
                self.default_lease_minutes, self.min_lease_minutes, self.max_lease_minutes
            )));
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::Invalid("sweep_batch_size must be at least 1".into()));
        }
        if self.reaper_interval_secs == 0 {
            return Err(ConfigError::Invalid("reaper_interval_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { name, value }),
    }
}
