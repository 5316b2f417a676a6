//! cluster-bootstrap
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────── primary ────────────────────────┐
//!   config (TOML,     │  Orchestrator ──startup──▶ worker#0 … worker#N-1         │
//!   env, CLI)   ────▶ │       ▲                     │ route modules → axum      │
//!                     │       │                     │ shared port (REUSEPORT)   │
//!   SIGINT/SIGTERM ─▶ │  RunningPool ──shutdown──▶  │ exit handlers, close      │
//!                     │       ◀──shutdown-complete──┘                           │
//!                     │  primary exit handlers → close → exit 0                 │
//!                     └─────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cluster_bootstrap::config::{self, Overrides};
use cluster_bootstrap::lifecycle::SignalListener;
use cluster_bootstrap::observability::{logging, metrics};
use cluster_bootstrap::orchestrator::{Orchestrator, OrchestratorError};
use cluster_bootstrap::routing::RouteCatalog;

#[derive(Debug, Parser)]
#[command(name = "cluster-bootstrap", version, about = "Run a pool of HTTP worker units")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Worker count override. Non-positive means one per core.
    #[arg(long, allow_negative_numbers = true)]
    workers: Option<i64>,

    /// Shared bind address for every worker.
    #[arg(long)]
    bind: Option<String>,
}

const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let overrides = Overrides {
        workers: cli.workers,
        bind_address: cli.bind.clone(),
    };
    let config = match config::load(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cluster-bootstrap: {e}");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    logging::init(&config.observability)?;
    tracing::info!("cluster-bootstrap v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.http.bind_address,
        workers = ?config.workers.count,
        routes = ?config.workers.routes,
        ack_timeout_secs = config.shutdown.ack_timeout_secs,
        "Configuration loaded"
    );

    let signals = SignalListener::install().map_err(OrchestratorError::Signals)?;

    let pool = match Orchestrator::new(config, RouteCatalog::with_builtin()).and_then(Orchestrator::execute) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start worker pool");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    let report = pool.run_until_signal(signals).await;
    tracing::info!(outcome = ?report.outcome, acknowledged = report.acknowledged, "Shutdown complete");

    Ok(ExitCode::from(report.exit_code()))
}
