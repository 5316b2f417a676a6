//! The running worker pool and its shutdown coordination.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{link, kinds, BusError, FrameReceiver, FrameSender, Message, MessageBus};
use crate::lifecycle::{Shutdown, SignalSource, TerminationSignal};
use crate::observability::metrics;
use crate::orchestrator::{FrozenContext, OrchestratorError, ShutdownTally};
use crate::process::{ProcessContext, TeardownReport};
use crate::routing::RouteCatalog;
use crate::worker::{WorkerBootstrap, WorkerKey, WorkerSettings};

/// Primary-side handle of one worker unit.
#[derive(Debug)]
pub struct WorkerHandle {
    key: WorkerKey,
    sender: FrameSender,
    thread: thread::JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn key(&self) -> WorkerKey {
        self.key
    }

    /// Whether the worker's thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}

/// How a coordinated shutdown ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every worker acknowledged; the primary tore down.
    Completed,
    /// The ack wait elapsed. The primary did not run its exit handlers.
    TimedOut { missing: Vec<WorkerKey> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    pub workers: usize,
    /// Acks received, duplicates included.
    pub acknowledged: usize,
    pub teardown: Option<TeardownReport>,
}

impl ShutdownReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == ShutdownOutcome::Completed
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            ShutdownOutcome::Completed => 0,
            ShutdownOutcome::TimedOut { .. } => 1,
        }
    }
}

/// A spawned pool. Its size never changes.
pub struct RunningPool {
    workers: BTreeMap<WorkerKey, WorkerHandle>,
    process: ProcessContext,
    bus: MessageBus,
    context: FrozenContext,
    tally: Arc<watch::Sender<ShutdownTally>>,
    termination: Shutdown,
    ack_timeout: Option<Duration>,
}

impl RunningPool {
    pub(crate) fn new(
        workers: BTreeMap<WorkerKey, WorkerHandle>,
        process: ProcessContext,
        bus: MessageBus,
        context: FrozenContext,
        tally: Arc<watch::Sender<ShutdownTally>>,
        termination: Shutdown,
        ack_timeout: Option<Duration>,
    ) -> Self {
        Self {
            workers,
            process,
            bus,
            context,
            tally,
            termination,
            ack_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn worker_keys(&self) -> Vec<WorkerKey> {
        self.workers.keys().copied().collect()
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerHandle> {
        self.workers.values()
    }

    /// Entries of the startup context every worker received.
    pub fn context(&self) -> &Map<String, Value> {
        self.context.entries()
    }

    pub fn startup_frame(&self) -> &str {
        self.context.frame()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn process(&self) -> &ProcessContext {
        &self.process
    }

    /// Snapshot of the shutdown acknowledgements so far.
    pub fn acknowledged(&self) -> ShutdownTally {
        self.tally.borrow().clone()
    }

    /// Send `message` to every worker. Returns how many channels accepted it.
    pub fn broadcast(&self, message: &Message) -> Result<usize, BusError> {
        let frame = message.encode()?;
        let mut delivered = 0;
        for (key, worker) in &self.workers {
            match worker.sender.send_frame(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(worker = %key, kind = %message.kind, error = %e, "Worker channel closed")
                }
            }
        }
        Ok(delivered)
    }

    /// Begin coordinated shutdown. Only the first call broadcasts.
    pub fn handle_termination_signal(&self, signal: TerminationSignal) -> bool {
        self.begin_shutdown(&signal.to_string())
    }

    fn begin_shutdown(&self, cause: &str) -> bool {
        if !self.termination.trigger() {
            tracing::info!(cause = %cause, "Shutdown already in progress; ignoring");
            return false;
        }

        tracing::info!(cause = %cause, workers = self.len(), "Shutting down workers");
        if let Err(e) = self.broadcast(&Message::new(kinds::SHUTDOWN)) {
            tracing::error!(error = %e, "Failed to broadcast shutdown");
        }
        true
    }

    /// Wait for termination, then for every worker's acknowledgement, then
    /// tear down the primary.
    pub async fn await_full_shutdown(self) -> ShutdownReport {
        self.wait_for_shutdown().await
    }

    /// Serve until a termination signal arrives and shutdown completes.
    /// Repeated signals are absorbed. If the signal source fails, the pool
    /// shuts down rather than running unsupervised.
    pub async fn run_until_signal(self, mut signals: impl SignalSource) -> ShutdownReport {
        let listen = async {
            loop {
                match signals.next_signal().await {
                    Ok(signal) => {
                        self.handle_termination_signal(signal);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Signal stream failed; shutting down");
                        self.begin_shutdown("signal stream failure");
                        return;
                    }
                }
            }
        };

        tokio::select! {
            report = self.wait_for_shutdown() => report,
            _ = listen => self.wait_for_shutdown().await,
        }
    }

    async fn wait_for_shutdown(&self) -> ShutdownReport {
        self.termination.wait().await;

        let expected = self.worker_keys();
        let mut rx = self.tally.subscribe();
        let all_acked = async { rx.wait_for(|tally| tally.covers(&expected)).await.is_ok() };
        let acked = match self.ack_timeout {
            Some(limit) => tokio::time::timeout(limit, all_acked).await.unwrap_or(false),
            None => all_acked.await,
        };

        let tally = self.acknowledged();
        if !acked {
            let missing = tally.missing(&expected);
            tracing::error!(
                missing = ?missing,
                acknowledged = tally.acked.len(),
                workers = expected.len(),
                "Timed out waiting for shutdown acknowledgements; forcing exit"
            );
            return ShutdownReport {
                outcome: ShutdownOutcome::TimedOut { missing },
                workers: expected.len(),
                acknowledged: tally.count,
                teardown: None,
            };
        }

        let teardown = self.process.teardown().await;
        if !teardown.is_clean() {
            tracing::warn!(
                exit_failures = ?teardown.exit.failed,
                close_failures = ?teardown.close.failed,
                "Primary teardown finished with failures"
            );
        }
        tracing::info!(workers = expected.len(), acknowledged = tally.count, "All workers shut down");

        ShutdownReport {
            outcome: ShutdownOutcome::Completed,
            workers: expected.len(),
            acknowledged: tally.count,
            teardown: Some(teardown),
        }
    }
}

impl std::fmt::Debug for RunningPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningPool")
            .field("workers", &self.worker_keys())
            .field("terminating", &self.termination.is_triggered())
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

/// Spawn one worker unit and hand it the startup frame.
pub(crate) fn spawn_worker(
    key: WorkerKey,
    settings: &Arc<WorkerSettings>,
    catalog: &Arc<RouteCatalog>,
    context: &FrozenContext,
    bus: &MessageBus,
    tally: &Arc<watch::Sender<ShutdownTally>>,
) -> Result<WorkerHandle, OrchestratorError> {
    let (sender, worker_inbound) = link::channel();
    let (worker_outbound, from_worker) = link::channel();

    let thread = WorkerBootstrap::new(
        key,
        Arc::clone(settings),
        Arc::clone(catalog),
        worker_inbound,
        worker_outbound,
    )
    .spawn_thread()
    .map_err(|source| OrchestratorError::Spawn { key, source })?;

    sender
        .send_frame(context.frame().to_string())
        .map_err(|source| OrchestratorError::Startup { key, source })?;

    let inbound = tokio::spawn(inbound_loop(key, from_worker, bus.clone(), Arc::clone(tally)));
    tracing::debug!(worker = %key, "Worker spawned");

    Ok(WorkerHandle {
        key,
        sender,
        thread,
        inbound,
    })
}

async fn inbound_loop(
    key: WorkerKey,
    mut from_worker: FrameReceiver,
    bus: MessageBus,
    tally: Arc<watch::Sender<ShutdownTally>>,
) {
    while let Some(frame) = from_worker.recv_frame().await {
        match Message::decode(&frame) {
            Ok(message) => on_worker_message(key, &message, &bus, &tally),
            Err(e) => tracing::warn!(worker = %key, error = %e, "Dropping undecodable frame from worker"),
        }
    }
    tracing::debug!(worker = %key, "Worker channel closed");
}

/// Count shutdown acks; pass everything else through to the primary's bus.
fn on_worker_message(
    key: WorkerKey,
    message: &Message,
    bus: &MessageBus,
    tally: &watch::Sender<ShutdownTally>,
) {
    if message.is(kinds::SHUTDOWN_COMPLETE) {
        tally.send_modify(|tally| tally.record(key));
        metrics::record_shutdown_ack();
        tracing::info!(worker = %key, "Worker acknowledged shutdown");
    } else {
        bus.emit(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::orchestrator::Orchestrator;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    struct ScriptedSignals(VecDeque<io::Result<TerminationSignal>>);

    #[async_trait]
    impl SignalSource for ScriptedSignals {
        async fn next_signal(&mut self) -> io::Result<TerminationSignal> {
            match self.0.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    fn small_pool() -> RunningPool {
        let mut config = AppConfig::default();
        config.instance.url = Some("https://svc.example.com".into());
        config.workers.count = Some(2);
        config.workers.routes = vec!["health".into()];
        config.http.bind_address = "127.0.0.1:0".into();
        config.shutdown.ack_timeout_secs = 10;
        Orchestrator::new(config, RouteCatalog::with_builtin())
            .unwrap()
            .execute()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_signals_complete_one_shutdown() {
        let pool = small_pool();
        let signals = ScriptedSignals(VecDeque::from([
            Ok(TerminationSignal::Terminate),
            Ok(TerminationSignal::Interrupt),
        ]));

        let report = tokio::time::timeout(Duration::from_secs(15), pool.run_until_signal(signals))
            .await
            .unwrap();
        assert_eq!(report.outcome, ShutdownOutcome::Completed);
        assert_eq!(report.acknowledged, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_signal_stream_still_shuts_down() {
        let pool = small_pool();
        let signals = ScriptedSignals(VecDeque::from([Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "signal streams closed",
        ))]));

        let report = tokio::time::timeout(Duration::from_secs(15), pool.run_until_signal(signals))
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.acknowledged, 2);
    }

    #[test]
    fn acks_are_tallied_and_other_messages_pass_through() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.on("listening", move |m| {
            s.lock().unwrap().push(m.payload["worker"].clone());
            Ok(())
        });
        let (tally, _) = watch::channel(ShutdownTally::default());

        let listening = Message::new(kinds::LISTENING).field("worker", "worker#1").unwrap();
        on_worker_message(WorkerKey::new(1), &listening, &bus, &tally);
        on_worker_message(WorkerKey::new(1), &Message::new(kinds::SHUTDOWN_COMPLETE), &bus, &tally);

        assert_eq!(seen.lock().unwrap().as_slice(), &[Value::from("worker#1")]);
        assert_eq!(tally.borrow().count, 1);
        assert!(tally.borrow().covers(&[WorkerKey::new(1)]));
    }

    #[test]
    fn exit_codes_follow_outcome() {
        let mut report = ShutdownReport {
            outcome: ShutdownOutcome::Completed,
            workers: 2,
            acknowledged: 2,
            teardown: Some(TeardownReport::default()),
        };
        assert_eq!(report.exit_code(), 0);

        report.outcome = ShutdownOutcome::TimedOut {
            missing: vec![WorkerKey::new(1)],
        };
        assert_eq!(report.exit_code(), 1);
        assert!(!report.is_complete());
    }
}
