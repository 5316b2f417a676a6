//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables consulted by [`apply_env`].
pub mod env {
    pub const WORKERS: &str = "BOOTSTRAP_WORKERS";
    pub const INSTANCE_URL: &str = "BOOTSTRAP_INSTANCE_URL";
    pub const BIND_ADDRESS: &str = "BOOTSTRAP_BIND_ADDRESS";
    pub const ROUTES: &str = "BOOTSTRAP_ROUTES";
    pub const ACK_TIMEOUT_SECS: &str = "BOOTSTRAP_ACK_TIMEOUT_SECS";
    pub const CACHE_URL: &str = "CACHE_URL";
    pub const QUEUE_URL: &str = "QUEUE_URL";
    pub const DATABASE_URL: &str = "DATABASE_URL";
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = read_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Command-line values layered over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<i64>,
    pub bind_address: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.workers.count = Some(workers);
        }
        if let Some(addr) = &self.bind_address {
            config.http.bind_address = addr.clone();
        }
    }
}

/// Load configuration the way the binary does: optional file, then the
/// process environment, then `overrides`, then a single validation pass.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<AppConfig, ConfigError> {
    load_from(path, |var| std::env::var(var).ok(), overrides)
}

/// [`load`] with an explicit environment lookup.
pub fn load_from<F>(path: Option<&Path>, lookup: F, overrides: &Overrides) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => AppConfig::default(),
    };

    apply_env(&mut config, lookup)?;
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment values onto `config`.
///
/// `lookup` abstracts the environment so callers can feed a fixed map.
pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(env::WORKERS) {
        let count = raw.trim().parse::<i64>().map_err(|_| ConfigError::Env {
            var: env::WORKERS,
            value: raw.clone(),
        })?;
        config.workers.count = Some(count);
    }

    if let Some(url) = lookup(env::INSTANCE_URL) {
        config.instance.url = Some(url);
    }

    if let Some(addr) = lookup(env::BIND_ADDRESS) {
        config.http.bind_address = addr;
    }

    if let Some(raw) = lookup(env::ROUTES) {
        config.workers.routes = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(raw) = lookup(env::ACK_TIMEOUT_SECS) {
        config.shutdown.ack_timeout_secs =
            raw.trim().parse().map_err(|_| ConfigError::Env {
                var: env::ACK_TIMEOUT_SECS,
                value: raw.clone(),
            })?;
    }

    if let Some(url) = lookup(env::CACHE_URL) {
        config.services.cache_url = Some(url);
    }
    if let Some(url) = lookup(env::QUEUE_URL) {
        config.services.queue_url = Some(url);
    }
    if let Some(url) = lookup(env::DATABASE_URL) {
        config.services.database_url = Some(url);
    }

    Ok(())
}
