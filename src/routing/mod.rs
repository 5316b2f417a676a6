//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! startup message (routes: ["health", "orders", ...])
//!     → catalog.rs (name → RouteModule)
//!     → registration.rs (register all concurrently, wait for all to settle)
//!     → composed axum Router
//!     → http::server (middleware + serve)
//! ```
//!
//! # Design Decisions
//! - Modules are resolved from a table built at startup, never from paths
//! - One failing module never blocks the others or the listener
//! - Modules receive the worker's context, never a global

pub mod builtin;
pub mod catalog;
pub mod registration;

use thiserror::Error;

use crate::bus::{BusError, Message, MessageBus};
use crate::bus::FrameSender;
use crate::process::{BoxError, ProcessContext};
use crate::resources::ServiceEndpoints;
use crate::worker::WorkerKey;

pub use catalog::{FnRoute, RouteCatalog, RouteModule};
pub use registration::{register_routes, RegistrationReport};

/// Error type for a single module registration attempt.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no route module named {0:?}")]
    NotFound(String),

    #[error("route module {module} failed: {source}")]
    Registration {
        module: String,
        #[source]
        source: BoxError,
    },

    #[error("route module {module} panicked: {message}")]
    Panicked { module: String, message: String },
}

/// Everything a route module may use while registering and serving.
#[derive(Debug, Clone)]
pub struct RouteContext {
    worker: WorkerKey,
    process: ProcessContext,
    endpoints: ServiceEndpoints,
    bus: MessageBus,
    primary: FrameSender,
}

impl RouteContext {
    pub fn new(
        worker: WorkerKey,
        process: ProcessContext,
        endpoints: ServiceEndpoints,
        bus: MessageBus,
        primary: FrameSender,
    ) -> Self {
        Self {
            worker,
            process,
            endpoints,
            bus,
            primary,
        }
    }

    pub fn worker(&self) -> WorkerKey {
        self.worker
    }

    /// Identity, resources and exit handlers of this worker unit.
    pub fn process(&self) -> &ProcessContext {
        &self.process
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    /// This worker's local bus; messages broadcast by the primary land here.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Send an application message to the primary, which republishes it on
    /// its own bus.
    pub fn send_to_primary(&self, message: &Message) -> Result<(), BusError> {
        self.primary.send(message)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use url::Url;

    pub fn route_context() -> RouteContext {
        let (primary, _) = crate::bus::link::channel();
        RouteContext::new(
            WorkerKey::new(0),
            ProcessContext::new(Url::parse("https://svc.example.com").unwrap()),
            ServiceEndpoints::default(),
            MessageBus::new(),
            primary,
        )
    }
}
