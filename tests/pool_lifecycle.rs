//! Pool spawn, startup handoff and coordinated shutdown.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use cluster_bootstrap::lifecycle::TerminationSignal;
use cluster_bootstrap::orchestrator::{Orchestrator, ShutdownOutcome};
use cluster_bootstrap::process::BoxError;
use cluster_bootstrap::routing::{RouteCatalog, RouteContext};
use cluster_bootstrap::worker::WorkerKey;
use serde_json::{json, Value};

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn test_pool_serves_and_shuts_down_cleanly() {
    let (sink, notified) = common::readiness_recorder();
    let primary_flushed = Arc::new(AtomicBool::new(false));
    let flushed = primary_flushed.clone();

    let orchestrator = Orchestrator::new(common::config(28301, 4), RouteCatalog::with_builtin())
        .unwrap()
        .with_readiness(sink)
        .on_exit("flush-primary", move || async move {
            flushed.store(true, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        });
    let mut listening = common::listening(orchestrator.bus());

    let pool = orchestrator.execute().unwrap();
    assert_eq!(
        pool.worker_keys(),
        (0..4).map(WorkerKey::new).collect::<Vec<_>>()
    );
    assert_eq!(*notified.lock().unwrap(), vec![4]);

    let reports = common::collect(&mut listening, 4).await;
    let workers: BTreeSet<String> = reports
        .iter()
        .map(|m| m.payload["worker"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(workers.len(), 4);

    let client = common::client();
    for _ in 0..8 {
        let res = client.get("http://127.0.0.1:28301/health").send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    assert!(pool.handle_termination_signal(TerminationSignal::Interrupt));
    assert!(!pool.handle_termination_signal(TerminationSignal::Terminate));

    let report = tokio::time::timeout(Duration::from_secs(15), pool.await_full_shutdown())
        .await
        .unwrap();
    assert_eq!(report.outcome, ShutdownOutcome::Completed);
    assert_eq!(report.workers, 4);
    assert_eq!(report.acknowledged, 4);
    assert_eq!(report.exit_code(), 0);
    assert!(primary_flushed.load(Ordering::SeqCst));
    assert_eq!(*notified.lock().unwrap(), vec![4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_worker_receives_the_same_startup_context() {
    let orchestrator = Orchestrator::new(common::config(28311, 2), RouteCatalog::with_builtin())
        .unwrap()
        .with_routes(["health", "identity"])
        .insert("region", "eu-west-1");
    let mut listening = common::listening(orchestrator.bus());

    let pool = orchestrator.execute().unwrap();
    let frame: Value = serde_json::from_str(pool.startup_frame()).unwrap();
    assert_eq!(
        frame,
        json!({ "type": "startup", "routes": ["health", "identity"], "region": "eu-west-1" })
    );
    assert_eq!(pool.context()["region"], "eu-west-1");

    common::collect(&mut listening, 2).await;

    // Each worker has its own identity but the same canonical URL.
    let client = common::client();
    let body: Value = client
        .get("http://127.0.0.1:28311/identity")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["canonical_url"], "https://orders.example.com/");

    pool.handle_termination_signal(TerminationSignal::Terminate);
    let report = tokio::time::timeout(Duration::from_secs(15), pool.await_full_shutdown())
        .await
        .unwrap();
    assert!(report.is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stuck_worker_forces_timed_out_shutdown() {
    let mut catalog = RouteCatalog::with_builtin();
    catalog.insert_fn("stall-on-exit", |ctx: RouteContext| async move {
        if ctx.worker().index() == 1 {
            ctx.process()
                .exit_handlers()
                .register("never-finishes", || async {
                    std::future::pending::<()>().await;
                    Ok::<(), BoxError>(())
                });
        }
        Ok::<_, BoxError>(Router::new())
    });

    let mut config = common::config(28321, 2);
    config.shutdown.ack_timeout_secs = 1;

    let primary_flushed = Arc::new(AtomicBool::new(false));
    let flushed = primary_flushed.clone();
    let orchestrator = Orchestrator::new(config, catalog)
        .unwrap()
        .with_routes(["health", "stall-on-exit"])
        .on_exit("flush-primary", move || async move {
            flushed.store(true, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        });
    let mut listening = common::listening(orchestrator.bus());

    let pool = orchestrator.execute().unwrap();
    common::collect(&mut listening, 2).await;

    assert!(pool.handle_termination_signal(TerminationSignal::Interrupt));
    let report = tokio::time::timeout(Duration::from_secs(15), pool.await_full_shutdown())
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        ShutdownOutcome::TimedOut {
            missing: vec![WorkerKey::new(1)]
        }
    );
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.exit_code(), 1);
    assert!(report.teardown.is_none());
    assert!(!primary_flushed.load(Ordering::SeqCst));
}
