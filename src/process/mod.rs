//! Process-unit state.
//!
//! # Responsibilities
//! - Generate the immutable instance identity (identity.rs)
//! - Own the unit's resource registry and exit handlers (context.rs)
//! - Run exit handlers without letting one failure stop the rest (exit.rs)
//!
//! # Design Decisions
//! - No globals: the primary and every worker build their own context
//! - Teardown order is fixed: exit handlers, then connections

pub mod context;
pub mod exit;
pub mod identity;

use std::any::Any;

pub use context::{ProcessContext, TeardownReport};
pub use exit::{ExitHandlers, ExitReport};
pub use identity::InstanceIdentity;

/// Boxed error returned by user-supplied hooks (factories, handlers, routes).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
