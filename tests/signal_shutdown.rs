//! Shutdown driven by real OS signals.
#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use cluster_bootstrap::lifecycle::SignalListener;
use cluster_bootstrap::orchestrator::{Orchestrator, ShutdownOutcome};
use cluster_bootstrap::routing::RouteCatalog;

mod common;

fn send_to_self(signal: &str) {
    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg(std::process::id().to_string())
        .status()
        .unwrap();
    assert!(status.success());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sigterm_then_sigint_completes_one_shutdown() {
    // Installed first so the signals below never reach the default handler.
    let signals = SignalListener::install().unwrap();

    let orchestrator = Orchestrator::new(common::config(28351, 2), RouteCatalog::with_builtin()).unwrap();
    let mut listening = common::listening(orchestrator.bus());
    let pool = orchestrator.execute().unwrap();
    common::collect(&mut listening, 2).await;

    let deliver = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        send_to_self("TERM");
        send_to_self("INT");
    };

    let (report, ()) = tokio::time::timeout(Duration::from_secs(20), async {
        tokio::join!(pool.run_until_signal(signals), deliver)
    })
    .await
    .unwrap();

    assert_eq!(report.outcome, ShutdownOutcome::Completed);
    assert_eq!(report.workers, 2);
    assert_eq!(report.acknowledged, 2);
    assert_eq!(report.exit_code(), 0);
}
