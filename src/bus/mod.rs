//! Message bus subsystem.
//!
//! # Data Flow
//! ```text
//! primary                                   worker unit
//!   FrameSender ──(startup, shutdown)──────▶ FrameReceiver
//!                                              → link::bridge (decode)
//!                                              → MessageBus::emit (local listeners)
//!
//!   per-worker inbound task ◀──(frames)──── FrameSender
//!     → shutdown-complete: tally
//!     → anything else: MessageBus::emit on the primary
//! ```
//!
//! # Design Decisions
//! - Only encoded frames cross the primary/worker boundary
//! - FIFO per channel, no ordering across channels
//! - Listener failures are isolated from the emitter and from each other

pub mod dispatcher;
pub mod link;
pub mod message;

pub use dispatcher::{EmitReport, MessageBus};
pub use link::{bridge, FrameReceiver, FrameSender};
pub use message::{kinds, BusError, Message};
