//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Readiness (readiness.rs):
//!     Pool spawned → notify supervisor once
//!
//! Shutdown (shutdown.rs):
//!     Latch triggered once → every waiter wakes, late subscribers included
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → orchestrator's termination handler
//! ```
//!
//! # Design Decisions
//! - Readiness means "spawned", not "serving"
//! - Repeated termination signals never restart the shutdown sequence
//! - Shutdown waits are bounded by configuration, not hard-coded

pub mod readiness;
pub mod shutdown;
pub mod signals;

pub use readiness::{ReadinessSink, SharedReadiness, SupervisorNotify};
pub use shutdown::Shutdown;
pub use signals::{SignalListener, SignalSource, TerminationSignal};
