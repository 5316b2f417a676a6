//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! shared TCP listener (net::listener)
//!     → server.rs (request ID, tracing, timeout)
//!     → composed router from routing::registration
//!     → route module handlers
//! ```

pub mod server;

pub use server::HttpServer;
