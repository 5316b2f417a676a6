//! Per-process memoized resource store.
//!
//! # Responsibilities
//! - Construct each named resource at most once per process unit
//! - Hand out the same `Arc` for a name for the lifetime of the registry
//! - Track closable connections and close them all at shutdown
//!
//! # Design Decisions
//! - One `OnceCell` per name: concurrent callers wait on a single factory
//! - A connection joins the close list on its first `get_or_connect`
//! - A failed factory leaves the name empty so the next call retries
//! - `close_all` drains the connection list; a connection closes once

use std::any::{type_name, Any};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::OnceCell;

use crate::observability::metrics;
use crate::process::{panic_message, BoxError};
use crate::resources::ResourceError;

type Instance = Arc<dyn Any + Send + Sync>;

/// One named slot: the memoized instance and whether it is on the close list.
#[derive(Default)]
struct Entry {
    cell: OnceCell<Instance>,
    tracked: AtomicBool,
}

/// A resource holding an external connection that must be closed at shutdown.
#[async_trait]
pub trait Closable: Send + Sync + 'static {
    async fn close(&self) -> Result<(), BoxError>;
}

/// Result of [`ResourceRegistry::close_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: Vec<String>,
    /// `(resource name, cause)` for each connection that failed to close.
    pub failed: Vec<(String, String)>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Memoized, per-process store of lazily constructed resources.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: DashMap<String, Arc<Entry>>,
    connections: Mutex<Vec<(String, Arc<dyn Closable>)>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the resource registered under `name`, constructing it with
    /// `factory` on first use.
    pub async fn get_or_create<T, E, F, Fut>(&self, name: &str, factory: F) -> Result<Arc<T>, ResourceError>
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (instance, _) = self.resolve(name, factory).await?;
        Ok(instance)
    }

    /// Like [`get_or_create`](Self::get_or_create), and also tracks the
    /// instance as a connection to close during shutdown.
    ///
    /// The instance is tracked once per name, even if an earlier
    /// `get_or_create` constructed it.
    pub async fn get_or_connect<T, E, F, Fut>(&self, name: &str, factory: F) -> Result<Arc<T>, ResourceError>
    where
        T: Closable,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (instance, entry) = self.resolve(name, factory).await?;
        if !entry.tracked.swap(true, Ordering::SeqCst) {
            let closable: Arc<dyn Closable> = instance.clone();
            self.connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((name.to_string(), closable));
        }
        Ok(instance)
    }

    async fn resolve<T, E, F, Fut>(&self, name: &str, factory: F) -> Result<(Arc<T>, Arc<Entry>), ResourceError>
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Clone the entry out so no map shard lock is held across the await.
        let entry = Arc::clone(&*self.entries.entry(name.to_string()).or_default());

        let instance = entry
            .cell
            .get_or_try_init(|| async {
                let value = factory().await.map_err(|e| ResourceError::Construction {
                    name: name.to_string(),
                    source: e.into(),
                })?;
                tracing::info!(resource = %name, kind = type_name::<T>(), "Resource constructed");
                Ok::<Instance, ResourceError>(Arc::new(value))
            })
            .await?;

        let instance = Arc::clone(instance)
            .downcast::<T>()
            .map_err(|_| ResourceError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })?;
        Ok((instance, entry))
    }

    /// Whether `name` has a constructed instance.
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.cell.initialized())
    }

    /// Number of connections awaiting `close_all`.
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Close every tracked connection.
    ///
    /// All closes run concurrently; a failure is logged and recorded and
    /// never prevents the others from completing.
    pub async fn close_all(&self) -> CloseReport {
        let connections = std::mem::take(
            &mut *self.connections.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let outcomes = join_all(connections.into_iter().map(|(name, conn)| async move {
            let result = match AssertUnwindSafe(conn.close()).catch_unwind().await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
            };
            (name, result)
        }))
        .await;

        let mut report = CloseReport::default();
        for (name, result) in outcomes {
            match result {
                Ok(()) => {
                    tracing::debug!(resource = %name, "Connection closed");
                    report.closed.push(name);
                }
                Err(cause) => {
                    tracing::warn!(resource = %name, error = %cause, "Connection failed to close");
                    metrics::record_resource_close_failure();
                    report.failed.push((name, cause));
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("entries", &self.entries.len())
            .field("connections", &self.connection_count())
            .finish()
    }
}
