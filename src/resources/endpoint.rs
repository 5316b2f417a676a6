//! External service endpoints and the generic dialed connection.
//!
//! Protocol clients (cache, queue, database) are external collaborators.
//! This module only resolves their connection strings and offers
//! [`TcpConnection`], a protocol-agnostic socket that satisfies
//! [`Closable`] so it can be tracked by the registry.

use std::fmt;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use url::Url;

use crate::config::ServicesConfig;
use crate::process::BoxError;
use crate::resources::registry::{Closable, ResourceRegistry};
use crate::resources::ResourceError;

/// Kind of external service a connection string points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Cache,
    Queue,
    Database,
}

impl ServiceKind {
    /// Registry name under which the shared client is stored.
    pub fn resource_name(self) -> &'static str {
        match self {
            ServiceKind::Cache => "cache",
            ServiceKind::Queue => "queue",
            ServiceKind::Database => "database",
        }
    }

    /// Port used when the connection string omits one.
    pub fn default_port(self) -> u16 {
        match self {
            ServiceKind::Cache => 6379,
            ServiceKind::Queue => 5672,
            ServiceKind::Database => 3306,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

/// A resolved connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub kind: ServiceKind,
    pub url: Url,
}

impl ServiceEndpoint {
    /// Host and port to dial.
    pub fn socket_target(&self) -> Result<(String, u16), ResourceError> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| ResourceError::InvalidEndpoint {
                kind: self.kind,
                reason: "missing host".into(),
            })?;
        let port = self.url.port().unwrap_or_else(|| self.kind.default_port());
        Ok((host.to_string(), port))
    }
}

/// Connection strings known to this process, as raw values.
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpoints {
    cache: Option<String>,
    queue: Option<String>,
    database: Option<String>,
}

impl ServiceEndpoints {
    pub fn from_config(config: &ServicesConfig) -> Self {
        Self {
            cache: config.cache_url.clone(),
            queue: config.queue_url.clone(),
            database: config.database_url.clone(),
        }
    }

    /// Resolve the endpoint for `kind`. Absence is only an error once a
    /// client actually asks for it.
    pub fn require(&self, kind: ServiceKind) -> Result<ServiceEndpoint, ResourceError> {
        let raw = match kind {
            ServiceKind::Cache => self.cache.as_deref(),
            ServiceKind::Queue => self.queue.as_deref(),
            ServiceKind::Database => self.database.as_deref(),
        }
        .filter(|raw| !raw.is_empty())
        .ok_or(ResourceError::MissingEndpoint(kind))?;

        let url = Url::parse(raw).map_err(|e| ResourceError::InvalidEndpoint {
            kind,
            reason: e.to_string(),
        })?;
        Ok(ServiceEndpoint { kind, url })
    }
}

/// A dialed TCP connection to an external service.
#[derive(Debug)]
pub struct TcpConnection {
    endpoint: ServiceEndpoint,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpConnection {
    pub async fn dial(endpoint: ServiceEndpoint) -> Result<Self, ResourceError> {
        let (host, port) = endpoint.socket_target()?;
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|source| ResourceError::Connect {
                kind: endpoint.kind,
                target: format!("{host}:{port}"),
                source,
            })?;

        tracing::info!(service = %endpoint.kind, host = %host, port, "Service connection established");
        Ok(Self {
            endpoint,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    pub async fn is_open(&self) -> bool {
        self.stream.lock().await.is_some()
    }
}

#[async_trait]
impl Closable for TcpConnection {
    async fn close(&self) -> Result<(), BoxError> {
        if let Some(mut stream) = self.stream.lock().await.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Shared connection for `kind`, dialed on first use in this process.
pub async fn connect(
    registry: &ResourceRegistry,
    endpoints: &ServiceEndpoints,
    kind: ServiceKind,
) -> Result<std::sync::Arc<TcpConnection>, ResourceError> {
    let endpoint = endpoints.require(kind)?;
    registry
        .get_or_connect(kind.resource_name(), || TcpConnection::dial(endpoint))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[test]
    fn missing_endpoint_is_reported_on_use() {
        let endpoints = ServiceEndpoints::default();
        assert!(matches!(
            endpoints.require(ServiceKind::Queue),
            Err(ResourceError::MissingEndpoint(ServiceKind::Queue))
        ));
    }

    #[test]
    fn default_port_applies() {
        let endpoints = ServiceEndpoints::from_config(&ServicesConfig {
            cache_url: Some("redis://cache.internal".into()),
            ..Default::default()
        });
        let endpoint = endpoints.require(ServiceKind::Cache).unwrap();
        assert_eq!(
            endpoint.socket_target().unwrap(),
            ("cache.internal".to_string(), 6379)
        );
    }

    #[tokio::test]
    async fn connect_is_memoized_and_closed_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let endpoints = ServiceEndpoints::from_config(&ServicesConfig {
            database_url: Some(format!("mysql://user:pw@{addr}/app")),
            ..Default::default()
        });
        let registry = ResourceRegistry::new();

        let a = connect(&registry, &endpoints, ServiceKind::Database).await.unwrap();
        let b = connect(&registry, &endpoints, ServiceKind::Database).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_open().await);

        let report = registry.close_all().await;
        assert_eq!(report.closed, vec!["database".to_string()]);
        assert!(!a.is_open().await);
    }
}
