//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, worker spans)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, primary only)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Instance ID and worker key flow through every worker's span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
