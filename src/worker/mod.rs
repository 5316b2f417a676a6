//! Worker units.
//!
//! # Lifecycle
//! ```text
//! spawn thread → current-thread runtime → WorkerBootstrap::run
//!     1. install startup/shutdown listeners, then the inbound bridge
//!     2. startup   → register routes (all settle) → bind shared port → serve
//!     3. shutdown  → stop accepting → drain (bounded) → exit handlers
//!                  → close connections → ack shutdown-complete → exit loop
//! ```
//!
//! # Design Decisions
//! - One OS thread and one event loop per worker; no shared mutable state
//!   with the primary, only frames
//! - Route and listener failures degrade the worker; they never crash it

pub mod bootstrap;

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::config::{AppConfig, HttpConfig};
use crate::resources::ServiceEndpoints;

pub use bootstrap::WorkerBootstrap;

/// Stable ordinal key of a worker within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerKey(usize);

impl WorkerKey {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// Read-only settings every worker is started with.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub canonical_url: Url,
    pub http: HttpConfig,
    pub drain_timeout: Duration,
    pub endpoints: ServiceEndpoints,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig, canonical_url: Url) -> Self {
        Self {
            canonical_url,
            http: config.http.clone(),
            drain_timeout: Duration::from_secs(config.workers.drain_timeout_secs),
            endpoints: ServiceEndpoints::from_config(&config.services),
        }
    }
}
