//! Worker pool orchestration on the primary.
//!
//! # Lifecycle
//! ```text
//! Orchestrator::new (canonical URL required)
//!     → with_routes / insert / with_readiness / on_exit
//!     → execute: freeze startup context → spawn worker#0..N-1
//!                → send identical startup frame → readiness (once)
//!     → RunningPool::run_until_signal
//!          first SIGINT/SIGTERM → broadcast shutdown
//!          later signals        → ignored
//!          all acks (bounded)   → primary exit handlers → close connections
//! ```
//!
//! # Design Decisions
//! - The pool size is decided once and never changes
//! - A worker that never acknowledges is reported after `shutdown.ack_timeout_secs`
//!   instead of blocking the primary forever

pub mod context;
pub mod pool;
pub mod sizing;
pub mod tally;

use std::future::Future;
use std::io;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

use crate::bus::{BusError, MessageBus};
use crate::config::AppConfig;
use crate::lifecycle::{ReadinessSink, SharedReadiness, Shutdown, SupervisorNotify};
use crate::observability::metrics;
use crate::process::{BoxError, ProcessContext};
use crate::routing::RouteCatalog;
use crate::worker::{WorkerKey, WorkerSettings};

pub use context::{FrozenContext, StartupContext};
pub use pool::{RunningPool, ShutdownOutcome, ShutdownReport, WorkerHandle};
pub use sizing::{decide_worker_count, host_parallelism};
pub use tally::ShutdownTally;

/// Errors that prevent the pool from starting.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("instance URL is not configured")]
    MissingInstanceUrl,

    #[error("startup context cannot be encoded: {0}")]
    Context(#[source] BusError),

    #[error("failed to spawn {key}: {source}")]
    Spawn {
        key: WorkerKey,
        #[source]
        source: io::Error,
    },

    #[error("failed to hand startup context to {key}: {source}")]
    Startup {
        key: WorkerKey,
        #[source]
        source: BusError,
    },

    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

/// Primary-side builder for the worker pool.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    catalog: Arc<RouteCatalog>,
    canonical_url: Url,
    count: usize,
    context: StartupContext,
    process: ProcessContext,
    bus: MessageBus,
    readiness: SharedReadiness,
}

impl Orchestrator {
    pub fn new(config: AppConfig, catalog: RouteCatalog) -> Result<Self, OrchestratorError> {
        let canonical_url = config
            .instance
            .canonical_url()
            .ok_or(OrchestratorError::MissingInstanceUrl)?;

        let mut context = StartupContext::new();
        context.set_routes(config.workers.routes.iter().cloned());

        Ok(Self {
            count: decide_worker_count(config.workers.count),
            process: ProcessContext::new(canonical_url.clone()),
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            canonical_url,
            context,
            bus: MessageBus::new(),
            readiness: Arc::new(SupervisorNotify),
        })
    }

    /// Replace the route module names workers load.
    pub fn with_routes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.set_routes(names);
        self
    }

    /// Add an arbitrary startup context entry.
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn with_readiness(mut self, sink: impl ReadinessSink + 'static) -> Self {
        self.readiness = Arc::new(sink);
        self
    }

    /// Register an exit handler on the primary. It runs only after every
    /// worker acknowledged shutdown.
    pub fn on_exit<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.process.exit_handlers().register(name, handler);
        self
    }

    /// The primary's bus. Application messages from workers are re-emitted here.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn process(&self) -> &ProcessContext {
        &self.process
    }

    pub fn context(&self) -> &StartupContext {
        &self.context
    }

    pub fn worker_count(&self) -> usize {
        self.count
    }

    /// Spawn the pool. Must be called inside a Tokio runtime.
    pub fn execute(self) -> Result<RunningPool, OrchestratorError> {
        let frozen = self.context.freeze().map_err(OrchestratorError::Context)?;
        let settings = Arc::new(WorkerSettings::from_config(&self.config, self.canonical_url.clone()));
        let (tally_tx, _) = watch::channel(ShutdownTally::default());
        let tally = Arc::new(tally_tx);

        tracing::info!(
            workers = self.count,
            instance_id = %self.process.identity().instance_id(),
            routes = ?self.context.routes(),
            "Spawning worker pool"
        );

        let mut workers = std::collections::BTreeMap::new();
        for index in 0..self.count {
            let key = WorkerKey::new(index);
            let handle = pool::spawn_worker(key, &settings, &self.catalog, &frozen, &self.bus, &tally)?;
            workers.insert(key, handle);
            metrics::record_worker_spawned();
        }
        metrics::record_pool_size(self.count);

        self.readiness.notify_ready(self.count);

        let ack_timeout = match self.config.shutdown.ack_timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        };

        Ok(RunningPool::new(
            workers,
            self.process,
            self.bus,
            frozen,
            tally,
            Shutdown::new(),
            ack_timeout,
        ))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("count", &self.count)
            .field("canonical_url", &self.canonical_url.as_str())
            .field("context", &self.context)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}
