//! Exit handlers run during a process unit's shutdown sequence.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use futures_util::FutureExt;

use crate::observability::metrics;
use crate::process::{panic_message, BoxError};

type ExitFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;
type Handler = Box<dyn FnOnce() -> ExitFuture + Send>;

/// Result of [`ExitHandlers::run_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub completed: Vec<String>,
    /// `(handler name, cause)` for each handler that failed or panicked.
    pub failed: Vec<(String, String)>,
}

impl ExitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered set of named cleanup handlers.
///
/// Handlers run once, sequentially, in registration order. A failing handler
/// is logged and recorded; the remaining handlers still run.
#[derive(Default)]
pub struct ExitHandlers {
    handlers: Mutex<Vec<(String, Handler)>>,
}

impl ExitHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler to run at shutdown.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let boxed: Handler = Box::new(move || Box::pin(handler()));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), boxed));
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and consume every registered handler.
    pub async fn run_all(&self) -> ExitReport {
        let handlers = std::mem::take(
            &mut *self.handlers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let mut report = ExitReport::default();
        for (name, handler) in handlers {
            let outcome = match catch_unwind(AssertUnwindSafe(handler)) {
                Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
                },
                Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!(handler = %name, "Exit handler completed");
                    report.completed.push(name);
                }
                Err(cause) => {
                    tracing::warn!(handler = %name, error = %cause, "Exit handler failed");
                    metrics::record_exit_handler_failure();
                    report.failed.push((name, cause));
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for ExitHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitHandlers").field("pending", &self.len()).finish()
    }
}
