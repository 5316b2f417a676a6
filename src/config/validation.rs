//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check values required before any worker is spawned
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("instance.url is required")]
    MissingInstanceUrl,

    #[error("instance.url is not a valid URL: {0}")]
    InvalidInstanceUrl(String),

    #[error("http.bind_address is not a socket address: {0}")]
    InvalidBindAddress(String),

    #[error("http.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("unknown observability.log_format: {0} (expected \"pretty\" or \"json\")")]
    UnknownLogFormat(String),

    #[error("observability.metrics_address is not a socket address: {0}")]
    InvalidMetricsAddress(String),
}

/// Validate a loaded configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.instance.url.as_deref() {
        None | Some("") => errors.push(ValidationError::MissingInstanceUrl),
        Some(raw) => {
            if config.instance.canonical_url().is_none() {
                errors.push(ValidationError::InvalidInstanceUrl(raw.to_string()));
            }
        }
    }

    if config.http.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.http.bind_address.clone(),
        ));
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::UnknownLogFormat(
            config.observability.log_format.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
