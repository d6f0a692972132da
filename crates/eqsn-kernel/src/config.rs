//! Kernel configuration.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with EQSN_ prefix)
//!
//! Values that are absent fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Settings for a simulation kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Number of execution contexts hosting group actors.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seed for measurement sampling. `None` seeds every group from entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Renormalize a group's state vector after this many gate applications.
    /// Zero disables periodic renormalization; measurement always renormalizes.
    #[serde(default = "default_renormalize_every")]
    pub renormalize_every: u32,
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

fn default_renormalize_every() -> u32 {
    32
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            seed: None,
            renormalize_every: default_renormalize_every(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: KernelConfig = serde_yaml_ng::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// - `EQSN_WORKERS`: execution context count
    /// - `EQSN_SEED`: measurement seed
    /// - `EQSN_RENORMALIZE_EVERY`: renormalization cadence
    pub fn from_env() -> Self {
        let mut config = KernelConfig::default();

        if let Some(workers) = env_parse::<usize>("EQSN_WORKERS") {
            if workers > 0 {
                config.workers = workers;
            } else {
                warn!("EQSN_WORKERS must be at least 1, keeping {}", config.workers);
            }
        }
        if let Some(seed) = env_parse::<u64>("EQSN_SEED") {
            config.seed = Some(seed);
        }
        if let Some(every) = env_parse::<u32>("EQSN_RENORMALIZE_EVERY") {
            config.renormalize_every = every;
        }

        config
    }

    /// Set the number of execution contexts.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Seed measurement sampling for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the renormalization cadence.
    pub fn with_renormalize_every(mut self, every: u32) -> Self {
        self.renormalize_every = every;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationError(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
