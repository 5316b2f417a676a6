//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT and SIGTERM
//! - Translate them into [`TerminationSignal`] values
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers stay installed after the first signal so repeats are absorbed
//!   by the orchestrator instead of killing the process

use std::fmt;
use std::io;

use async_trait::async_trait;

/// A signal that requests termination of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / ctrl-c.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Anything that yields termination signals to the pool.
#[async_trait]
pub trait SignalSource: Send {
    /// Wait for the next signal. An error means no further signals arrive.
    async fn next_signal(&mut self) -> io::Result<TerminationSignal>;
}

#[async_trait]
impl SignalSource for SignalListener {
    async fn next_signal(&mut self) -> io::Result<TerminationSignal> {
        self.recv().await
    }
}

/// Installed signal handlers.
#[cfg(unix)]
pub struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Install the handlers. Must be called inside a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next termination signal.
    pub async fn recv(&mut self) -> io::Result<TerminationSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Ok(TerminationSignal::Interrupt),
            Some(()) = self.terminate.recv() => Ok(TerminationSignal::Terminate),
            else => Err(io::Error::new(io::ErrorKind::BrokenPipe, "signal streams closed")),
        }
    }
}

/// Installed signal handlers.
#[cfg(not(unix))]
pub struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn install() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> io::Result<TerminationSignal> {
        tokio::signal::ctrl_c().await?;
        Ok(TerminationSignal::Interrupt)
    }
}
