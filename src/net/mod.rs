//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! worker startup (after route registration settles)
//!     → listener.rs (bind shared port)
//!     → http::server (serve composed router)
//!
//! N workers × same port → kernel distributes accepted connections
//! ```

pub mod listener;

pub use listener::{bind_shared, ListenerError};
