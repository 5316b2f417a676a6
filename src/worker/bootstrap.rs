//! Worker bootstrap: from spawned thread to serving HTTP endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::bus::{bridge, kinds, FrameReceiver, FrameSender, Message, MessageBus};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::bind_shared;
use crate::process::ProcessContext;
use crate::routing::{register_routes, RouteCatalog, RouteContext};
use crate::worker::{WorkerKey, WorkerSettings};

/// Everything a worker unit needs before it starts its event loop.
pub struct WorkerBootstrap {
    key: WorkerKey,
    settings: Arc<WorkerSettings>,
    catalog: Arc<RouteCatalog>,
    inbound: FrameReceiver,
    outbound: FrameSender,
}

/// Live state of a running worker, shared by its message handlers.
struct WorkerState {
    key: WorkerKey,
    settings: Arc<WorkerSettings>,
    catalog: Arc<RouteCatalog>,
    process: ProcessContext,
    bus: MessageBus,
    outbound: FrameSender,
    started: AtomicBool,
    /// Fired by the first `shutdown`; stops the HTTP listener.
    stopping: Shutdown,
    /// Fired once `shutdown-complete` has been sent.
    done: Shutdown,
    /// Route registration in progress; teardown waits for it.
    startup: Mutex<Option<JoinHandle<()>>>,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl WorkerBootstrap {
    pub fn new(
        key: WorkerKey,
        settings: Arc<WorkerSettings>,
        catalog: Arc<RouteCatalog>,
        inbound: FrameReceiver,
        outbound: FrameSender,
    ) -> Self {
        Self {
            key,
            settings,
            catalog,
            inbound,
            outbound,
        }
    }

    pub fn key(&self) -> WorkerKey {
        self.key
    }

    /// Run this worker on a dedicated OS thread with its own
    /// single-threaded runtime.
    pub fn spawn_thread(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(self.key.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(worker = %self.key, error = %e, "Failed to build worker runtime");
                        return;
                    }
                };
                runtime.block_on(self.run());
            })
    }

    /// The worker's event loop. Returns after `shutdown-complete` was sent,
    /// or after the primary's channel closed and teardown finished.
    pub async fn run(self) {
        let WorkerBootstrap {
            key,
            settings,
            catalog,
            inbound,
            outbound,
        } = self;

        let process = ProcessContext::new(settings.canonical_url.clone());
        let span = tracing::info_span!(
            "worker",
            key = %key,
            instance_id = %process.identity().instance_id()
        );

        let state = Arc::new(WorkerState {
            key,
            settings,
            catalog,
            process,
            bus: MessageBus::new(),
            outbound,
            started: AtomicBool::new(false),
            stopping: Shutdown::new(),
            done: Shutdown::new(),
            startup: Mutex::new(None),
            server: Mutex::new(None),
        });

        async move {
            // Listeners first, bridge second: nothing is consumed before both exist.
            install_listeners(&state);
            tracing::info!("Worker started; waiting for startup");

            tokio::select! {
                _ = bridge(inbound, state.bus.clone()) => {
                    tracing::warn!("Primary channel closed");
                    if state.stopping.trigger() {
                        Arc::clone(&state).stop().await;
                    }
                }
                _ = state.done.wait() => {}
            }

            state.done.wait().await;
            tracing::info!("Worker exiting");
        }
        .instrument(span)
        .await
    }
}

fn install_listeners(state: &Arc<WorkerState>) {
    let weak: Weak<WorkerState> = Arc::downgrade(state);
    state.bus.on(kinds::STARTUP, move |message| {
        let Some(state) = weak.upgrade() else {
            return Ok(());
        };
        if state.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Duplicate startup message ignored");
            return Ok(());
        }
        let routes = route_names(message);
        let handle = tokio::spawn(Arc::clone(&state).start(routes).in_current_span());
        *state.startup.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    });

    let weak: Weak<WorkerState> = Arc::downgrade(state);
    state.bus.on(kinds::SHUTDOWN, move |_| {
        let Some(state) = weak.upgrade() else {
            return Ok(());
        };
        if state.stopping.trigger() {
            tokio::spawn(state.stop().in_current_span());
        } else {
            tracing::debug!("Duplicate shutdown message ignored");
        }
        Ok(())
    });
}

impl WorkerState {
    async fn start(self: Arc<Self>, routes: Vec<String>) {
        if self.stopping.is_triggered() {
            tracing::info!("Startup received after shutdown; not registering routes");
            return;
        }
        tracing::info!(routes = ?routes, "Startup received; registering routes");

        let ctx = RouteContext::new(
            self.key,
            self.process.clone(),
            self.settings.endpoints.clone(),
            self.bus.clone(),
            self.outbound.clone(),
        );
        let report = register_routes(&self.catalog, &routes, &ctx).await;
        tracing::info!(
            registered = ?report.registered(),
            failed = ?report.failed_names(),
            "Route registration settled"
        );

        if self.stopping.is_triggered() {
            tracing::info!("Shutdown requested before listener start; not serving");
            return;
        }

        let listener = match bind_shared(&self.settings.http) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "Worker cannot listen; staying up without HTTP");
                return;
            }
        };
        let address = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.settings.http.bind_address.clone());

        let server = HttpServer::new(report.into_router(), &self.settings.http);
        let handle = tokio::spawn(
            server
                .run(listener, self.stopping.clone())
                .in_current_span(),
        );
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        let mut payload = Map::new();
        payload.insert("worker".into(), Value::from(self.key.to_string()));
        payload.insert("address".into(), Value::from(address));
        if let Err(e) = self
            .outbound
            .send(&Message::with_payload(kinds::LISTENING, payload))
        {
            tracing::warn!(error = %e, "Could not report listening address");
        }
    }

    async fn stop(self: Arc<Self>) {
        tracing::info!("Shutdown received; draining");

        // Connections dialed by route modules must exist before teardown closes them.
        let startup = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = startup {
            if tokio::time::timeout(self.settings.drain_timeout, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Route registration still running at shutdown; aborting it");
                handle.abort();
            }
        }

        let server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = server {
            match tokio::time::timeout(self.settings.drain_timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "HTTP server exited with error"),
                Ok(Err(e)) => tracing::warn!(error = %e, "HTTP server task failed"),
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = self.settings.drain_timeout.as_secs(),
                        "Drain timeout elapsed; aborting in-flight requests"
                    );
                    handle.abort();
                }
            }
        }

        let report = self.process.teardown().await;
        if report.is_clean() {
            tracing::info!(
                exit_handlers = report.exit.completed.len(),
                connections = report.close.closed.len(),
                "Worker teardown complete"
            );
        } else {
            tracing::warn!(
                exit_failures = ?report.exit.failed,
                close_failures = ?report.close.failed,
                "Worker teardown finished with failures"
            );
        }

        match self.outbound.send(&Message::new(kinds::SHUTDOWN_COMPLETE)) {
            Ok(()) => tracing::info!("Shutdown acknowledged"),
            Err(e) => tracing::warn!(error = %e, "Could not acknowledge shutdown"),
        }
        self.done.trigger();
    }
}

/// Route names carried by a `startup` message.
fn route_names(message: &Message) -> Vec<String> {
    match message.payload.get("routes") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item.as_str() {
                Some(name) => Some(name.to_string()),
                None => {
                    tracing::warn!(entry = %item, "Ignoring non-string route name");
                    None
                }
            })
            .collect(),
        Some(other) => {
            tracing::warn!(routes = %other, "Startup routes is not an array");
            Vec::new()
        }
        None => {
            tracing::warn!("Startup message carries no routes");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::link;
    use crate::config::HttpConfig;
    use crate::process::BoxError;
    use crate::resources::ServiceEndpoints;
    use axum::Router;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;

    fn settings() -> Arc<WorkerSettings> {
        Arc::new(WorkerSettings {
            canonical_url: Url::parse("https://svc.example.com").unwrap(),
            http: HttpConfig {
                bind_address: "127.0.0.1:0".into(),
                ..Default::default()
            },
            drain_timeout: Duration::from_secs(2),
            endpoints: ServiceEndpoints::default(),
        })
    }

    async fn next(rx: &mut FrameReceiver) -> Message {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("worker message")
            .expect("channel open")
            .expect("decodable frame")
    }

    #[test]
    fn route_names_skip_non_strings() {
        let message = Message::new(kinds::STARTUP)
            .field("routes", json!(["health", 3, "orders"]))
            .unwrap();
        assert_eq!(route_names(&message), vec!["health", "orders"]);
        assert!(route_names(&Message::new(kinds::STARTUP)).is_empty());
    }

    #[tokio::test]
    async fn serves_registered_routes_then_acknowledges_shutdown() {
        let flushed = Arc::new(AtomicBool::new(false));
        let mut catalog = RouteCatalog::with_builtin();
        let f = flushed.clone();
        catalog.insert_fn("flusher", move |ctx: RouteContext| {
            let f = f.clone();
            async move {
                ctx.process().exit_handlers().register("flush", move || async move {
                    f.store(true, Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                });
                Ok::<_, BoxError>(Router::new())
            }
        });

        let (to_worker, worker_in) = link::channel();
        let (worker_out, mut from_worker) = link::channel();
        let worker = tokio::spawn(
            WorkerBootstrap::new(WorkerKey::new(3), settings(), Arc::new(catalog), worker_in, worker_out).run(),
        );

        to_worker
            .send(
                &Message::new(kinds::STARTUP)
                    .field("routes", json!(["health", "flusher", "does-not-exist"]))
                    .unwrap(),
            )
            .unwrap();

        let listening = next(&mut from_worker).await;
        assert!(listening.is(kinds::LISTENING));
        assert_eq!(listening.payload["worker"], "worker#3");
        let address = listening.payload["address"].as_str().unwrap().to_string();

        let body: serde_json::Value = reqwest::get(format!("http://{address}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");

        to_worker.send(&Message::new(kinds::SHUTDOWN)).unwrap();
        let ack = next(&mut from_worker).await;
        assert!(ack.is(kinds::SHUTDOWN_COMPLETE));
        assert!(flushed.load(Ordering::SeqCst));

        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_before_startup_still_acknowledges() {
        let (to_worker, worker_in) = link::channel();
        let (worker_out, mut from_worker) = link::channel();
        let worker = tokio::spawn(
            WorkerBootstrap::new(
                WorkerKey::new(0),
                settings(),
                Arc::new(RouteCatalog::with_builtin()),
                worker_in,
                worker_out,
            )
            .run(),
        );

        to_worker.send(&Message::new(kinds::SHUTDOWN)).unwrap();
        to_worker.send(&Message::new(kinds::SHUTDOWN)).unwrap();

        let ack = next(&mut from_worker).await;
        assert!(ack.is(kinds::SHUTDOWN_COMPLETE));
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }

    struct TrackedClient {
        closed: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl crate::resources::Closable for TrackedClient {
        async fn close(&self) -> Result<(), BoxError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_during_registration_closes_late_connections() {
        let closed = Arc::new(AtomicBool::new(false));
        let entered = Arc::new(tokio::sync::Notify::new());
        let mut catalog = RouteCatalog::new();
        let (c, e) = (closed.clone(), entered.clone());
        catalog.insert_fn("slow-dial", move |ctx: RouteContext| {
            let (c, e) = (c.clone(), e.clone());
            async move {
                e.notify_one();
                tokio::time::sleep(Duration::from_millis(300)).await;
                ctx.process()
                    .resources()
                    .get_or_connect("cache", || async move {
                        Ok::<_, BoxError>(TrackedClient { closed: c })
                    })
                    .await?;
                Ok::<_, BoxError>(Router::new())
            }
        });

        let (to_worker, worker_in) = link::channel();
        let (worker_out, mut from_worker) = link::channel();
        let worker = tokio::spawn(
            WorkerBootstrap::new(WorkerKey::new(0), settings(), Arc::new(catalog), worker_in, worker_out).run(),
        );

        to_worker
            .send(&Message::new(kinds::STARTUP).field("routes", json!(["slow-dial"])).unwrap())
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), entered.notified())
            .await
            .unwrap();
        to_worker.send(&Message::new(kinds::SHUTDOWN)).unwrap();

        // The first frame back is the ack: the worker never starts listening.

        let ack = next(&mut from_worker).await;
        assert!(ack.is(kinds::SHUTDOWN_COMPLETE));
        assert!(closed.load(Ordering::SeqCst));

        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
