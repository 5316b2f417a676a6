//! Resource subsystem.
//!
//! # Data Flow
//! ```text
//! route handler needs a client
//!     → registry.rs (lookup by name)
//!         hit  → same Arc as every earlier caller
//!         miss → factory (e.g. endpoint.rs dial) → store → track if Closable
//!
//! shutdown sequence
//!     → registry.rs close_all (every tracked connection, concurrently)
//! ```
//!
//! # Design Decisions
//! - One registry per process unit, threaded through `ProcessContext`
//! - Nothing is shared by reference between workers
//! - Entries are never evicted; connections close only during shutdown

pub mod endpoint;
pub mod registry;

use thiserror::Error;

use crate::process::BoxError;

pub use endpoint::{connect, ServiceEndpoint, ServiceEndpoints, ServiceKind, TcpConnection};
pub use registry::{Closable, CloseReport, ResourceRegistry};

/// Error type for resource construction.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no connection string configured for {0}")]
    MissingEndpoint(ServiceKind),

    #[error("invalid {kind} connection string: {reason}")]
    InvalidEndpoint { kind: ServiceKind, reason: String },

    #[error("failed to connect to {kind} at {target}: {source}")]
    Connect {
        kind: ServiceKind,
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to construct resource {name}: {source}")]
    Construction {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("resource {name} is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}
