//! Frame channels between the primary and a worker unit.
//!
//! Each direction is an unbounded tokio mpsc channel carrying encoded frames,
//! so nothing but bytes crosses the boundary and per-channel order is FIFO.

use tokio::sync::mpsc;

use crate::bus::dispatcher::MessageBus;
use crate::bus::message::{BusError, Message};

/// Sending half of a frame channel.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<String>,
}

impl FrameSender {
    /// Encode and send a message.
    pub fn send(&self, message: &Message) -> Result<(), BusError> {
        self.send_frame(message.encode()?)
    }

    /// Send an already encoded frame verbatim.
    pub fn send_frame(&self, frame: String) -> Result<(), BusError> {
        self.tx.send(frame).map_err(|_| BusError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a frame channel.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FrameReceiver {
    /// Next raw frame, `None` once every sender is gone.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next decoded message.
    pub async fn recv(&mut self) -> Option<Result<Message, BusError>> {
        self.rx.recv().await.map(|frame| Message::decode(&frame))
    }
}

/// Create one direction of a worker link.
pub fn channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Inbound adapter: decode every frame from `inbound` and re-emit it on
/// `bus`, in arrival order, until the channel closes.
///
/// Business code subscribed on `bus` cannot tell these messages apart from
/// locally emitted ones.
pub async fn bridge(mut inbound: FrameReceiver, bus: MessageBus) {
    while let Some(frame) = inbound.recv_frame().await {
        match Message::decode(&frame) {
            Ok(message) => {
                tracing::trace!(kind = %message.kind, "Bridged inbound message");
                bus.emit(&message);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
            }
        }
    }
    tracing::debug!("Inbound channel closed");
}
