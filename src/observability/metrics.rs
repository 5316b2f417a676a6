//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bootstrap_pool_size` (gauge): workers in the pool
//! - `bootstrap_workers_spawned_total` (counter)
//! - `bootstrap_route_registrations_total` (counter): by `outcome`
//! - `bootstrap_shutdown_acks_total` (counter)
//! - `bootstrap_exit_handler_failures_total` (counter)
//! - `bootstrap_resource_close_failures_total` (counter)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Only the primary installs the Prometheus exporter; worker threads share it

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape endpoint.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_pool_size(size: usize) {
    gauge!("bootstrap_pool_size").set(size as f64);
}

pub fn record_worker_spawned() {
    counter!("bootstrap_workers_spawned_total").increment(1);
}

pub fn record_route_registration(registered: bool) {
    let outcome = if registered { "registered" } else { "failed" };
    counter!("bootstrap_route_registrations_total", "outcome" => outcome).increment(1);
}

pub fn record_shutdown_ack() {
    counter!("bootstrap_shutdown_acks_total").increment(1);
}

pub fn record_exit_handler_failure() {
    counter!("bootstrap_exit_handler_failures_total").increment(1);
}

pub fn record_resource_close_failure() {
    counter!("bootstrap_resource_close_failures_total").increment(1);
}
