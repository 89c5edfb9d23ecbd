//! Runtime configuration
//!
//! Controls how the process-wide background executor is built.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (DEFERRED_WORKERS, DEFERRED_THREAD_NAME)
//! 2. TOML file named by DEFERRED_CONFIG
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use deferred::util::config::RuntimeConfig;
//!
//! let config: RuntimeConfig = toml::from_str("[pool]\nnum_workers = 2").unwrap();
//! assert_eq!(config.pool.num_workers, 2);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::executor::{PoolConfig, PoolError};

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "DEFERRED_CONFIG";

/// Environment variable overriding the worker count.
pub const WORKERS_ENV: &str = "DEFERRED_WORKERS";

/// Environment variable overriding the worker thread name prefix.
pub const THREAD_NAME_ENV: &str = "DEFERRED_THREAD_NAME";

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Shared executor settings
    #[serde(default)]
    pub pool: PoolConfig,
}

impl RuntimeConfig {
    /// Build the configuration from the environment.
    ///
    /// Never fails: an unreadable file or a malformed variable is logged and
    /// the lower-priority value is kept.
    pub fn from_env() -> Self {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => load_config(Path::new(&path)).unwrap_or_else(|err| {
                warn!(error = %err, "ignoring runtime config file");
                RuntimeConfig::default()
            }),
            None => RuntimeConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply variable overrides read through `lookup`.
    pub fn apply_env<F>(
        &mut self,
        lookup: F,
    ) where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(WORKERS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.pool.num_workers = n,
                _ => warn!(value = %raw, "{} must be a positive integer", WORKERS_ENV),
            }
        }
        if let Some(name) = lookup(THREAD_NAME_ENV) {
            if !name.is_empty() {
                self.pool.thread_name = name;
            }
        }
    }

    /// Reject values the executor cannot be built with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.num_workers == 0 {
            return Err(ConfigError::Invalid(
                "pool.num_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RuntimeConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Shared executor is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Pool(#[from] PoolError),
}
