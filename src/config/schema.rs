//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bootstrap
//! layer. All types derive Serde traits for deserialization from config files;
//! environment overrides are layered on top by the loader.

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration for the primary process and its workers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Identity of this deployment.
    pub instance: InstanceConfig,

    /// Worker pool sizing and startup payload.
    pub workers: WorkerConfig,

    /// HTTP listener shared by every worker.
    pub http: HttpConfig,

    /// Coordinated shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Connection strings for lazily constructed clients.
    pub services: ServicesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Instance identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InstanceConfig {
    /// Canonical public URL of this instance. Required.
    pub url: Option<String>,
}

impl InstanceConfig {
    /// Parsed canonical URL, if present and well formed.
    pub fn canonical_url(&self) -> Option<Url> {
        self.url.as_deref().and_then(|raw| Url::parse(raw).ok())
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Explicit worker count. Absent or non-positive means "one per core".
    pub count: Option<i64>,

    /// Route modules every worker loads at startup.
    pub routes: Vec<String>,

    /// How long a worker waits for in-flight requests after `shutdown`.
    pub drain_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: None,
            routes: vec!["health".to_string(), "identity".to_string()],
            drain_timeout_secs: 10,
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address shared by all workers (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Listen backlog passed to the socket.
    pub backlog: u32,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Shutdown coordination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds the primary waits for every `shutdown-complete` ack.
    /// Zero waits forever.
    pub ack_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: 30,
        }
    }
}

/// Connection strings for external services.
///
/// Format and validation belong to the clients that consume them; the
/// bootstrap layer only checks presence when a client is first constructed.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServicesConfig {
    pub cache_url: Option<String>,
    pub queue_url: Option<String>,
    pub database_url: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable the Prometheus endpoint on the primary.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [instance]
            url = "https://api.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.http.bind_address, "0.0.0.0:8080");
        assert_eq!(config.workers.routes, vec!["health", "identity"]);
        assert_eq!(config.shutdown.ack_timeout_secs, 30);
        assert!(config.workers.count.is_none());
        assert_eq!(
            config.instance.canonical_url().unwrap().as_str(),
            "https://api.example.com/"
        );
    }

    #[test]
    fn malformed_instance_url_is_not_canonical() {
        let instance = InstanceConfig {
            url: Some("not a url".into()),
        };
        assert!(instance.canonical_url().is_none());
    }
}
