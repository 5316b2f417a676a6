//! Local type-keyed publish/subscribe.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::bus::message::{BusError, Message};
use crate::process::panic_message;

/// A registered listener.
pub type Listener = Arc<dyn Fn(&Message) -> Result<(), BusError> + Send + Sync>;

/// Outcome of a single [`MessageBus::emit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked.
    pub failed: usize,
}

impl EmitReport {
    pub fn listeners(&self) -> usize {
        self.delivered + self.failed
    }
}

/// In-process message dispatcher keyed by message kind.
///
/// Cloning is cheap; clones share the listener table. Listeners run
/// synchronously on the emitting task in registration order. A listener
/// that fails or panics is logged and skipped; it never breaks delivery to
/// the listeners after it and never reaches the emitter.
#[derive(Clone, Default)]
pub struct MessageBus {
    listeners: Arc<RwLock<HashMap<String, Vec<Listener>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for messages of `kind`.
    pub fn on<F>(&self, kind: impl Into<String>, listener: F)
    where
        F: Fn(&Message) -> Result<(), BusError> + Send + Sync + 'static,
    {
        let mut table = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table.entry(kind.into()).or_default().push(Arc::new(listener));
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Dispatch `message` to every listener registered for its kind.
    pub fn emit(&self, message: &Message) -> EmitReport {
        // Snapshot so listeners may register further listeners without deadlocking.
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.kind)
            .cloned()
            .unwrap_or_default();

        let mut report = EmitReport::default();
        if snapshot.is_empty() {
            tracing::trace!(kind = %message.kind, "No listeners for message");
            return report;
        }

        for (index, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(kind = %message.kind, listener = index, error = %e, "Listener failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    tracing::error!(
                        kind = %message.kind,
                        listener = index,
                        panic = %panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let mut kinds: Vec<_> = table.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        kinds.sort_unstable();
        f.debug_struct("MessageBus").field("listeners", &kinds).finish()
    }
}
