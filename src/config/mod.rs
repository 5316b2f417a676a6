//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overlay, .env honoured by the binary)
//!     → loader.rs (command-line overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc with the orchestrator and every worker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no hot reload
//! - All fields have defaults to allow minimal configs
//! - A missing instance URL is fatal before any worker is spawned

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, load_from, ConfigError, Overrides};
pub use schema::AppConfig;
pub use schema::HttpConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServicesConfig;
pub use schema::ShutdownConfig;
pub use schema::WorkerConfig;
