//! Cluster bootstrap library
//!
//! Runs one primary and a pool of worker units. Each worker loads named route
//! modules, serves them on a shared port, and takes part in a coordinated
//! shutdown.

// Coordination
pub mod bus;
pub mod orchestrator;
pub mod worker;

// Per-process state
pub mod process;
pub mod resources;

// Serving
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use bus::{Message, MessageBus};
pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use orchestrator::{Orchestrator, OrchestratorError, RunningPool, ShutdownOutcome, ShutdownReport};
pub use process::ProcessContext;
pub use routing::{RouteCatalog, RouteContext, RouteModule};
pub use worker::WorkerKey;
