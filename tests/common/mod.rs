//! Shared utilities for pool integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cluster_bootstrap::bus::{kinds, Message, MessageBus};
use cluster_bootstrap::config::AppConfig;
use tokio::sync::mpsc;

/// Config for a pool of `workers` sharing `127.0.0.1:port`.
pub fn config(port: u16, workers: i64) -> AppConfig {
    let mut config = AppConfig::default();
    config.instance.url = Some("https://orders.example.com".into());
    config.workers.count = Some(workers);
    config.workers.drain_timeout_secs = 2;
    config.http.bind_address = format!("127.0.0.1:{port}");
    config.shutdown.ack_timeout_secs = 10;
    config
}

/// Readiness sink that records every notification.
#[allow(dead_code)]
pub fn readiness_recorder() -> (impl Fn(usize) + Send + Sync + 'static, Arc<Mutex<Vec<usize>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    (move |n: usize| s.lock().unwrap().push(n), seen)
}

/// Forward every message of `kind` on `bus` into a channel.
pub fn subscribe(bus: &MessageBus, kind: &str) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.on(kind, move |message| {
        let _ = tx.send(message.clone());
        Ok(())
    });
    rx
}

/// Subscribe to `listening` reports from workers.
pub fn listening(bus: &MessageBus) -> mpsc::UnboundedReceiver<Message> {
    subscribe(bus, kinds::LISTENING)
}

/// Wait for `n` messages, failing the test after a few seconds.
pub async fn collect(rx: &mut mpsc::UnboundedReceiver<Message>, n: usize) -> Vec<Message> {
    let mut messages = Vec::with_capacity(n);
    while messages.len() < n {
        let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for worker message")
            .expect("bus channel closed");
        messages.push(message);
    }
    messages
}

/// HTTP client that does not reuse connections across workers.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
