//! Shared-port TCP listener.
//!
//! # Responsibilities
//! - Bind the configured address with port sharing enabled
//! - Let every worker bind the same port; the kernel spreads accepted
//!   connections across them
//!
//! # Design Decisions
//! - `SO_REUSEADDR` everywhere, `SO_REUSEPORT` on Unix
//! - No application-level load balancing

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};

use crate::config::HttpConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {0:?}")]
    Address(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind `config.bind_address` so that sibling workers can bind it too.
pub fn bind_shared(config: &HttpConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|_| ListenerError::Address(config.bind_address.clone()))?;

    let bind_err = |source| ListenerError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true).map_err(bind_err)?;

    socket.bind(addr).map_err(bind_err)?;
    let listener = socket.listen(config.backlog).map_err(bind_err)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(addr),
        backlog = config.backlog,
        "Listener bound"
    );
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(addr: &str) -> HttpConfig {
        HttpConfig {
            bind_address: addr.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rejects_unparseable_address() {
        assert!(matches!(
            bind_shared(&config("localhost:80")),
            Err(ListenerError::Address(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn two_listeners_share_a_port() {
        let first = bind_shared(&config("127.0.0.1:0")).unwrap();
        let port = first.local_addr().unwrap().port();

        let second = bind_shared(&config(&format!("127.0.0.1:{port}"))).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }
}
