//! Message type and wire format.
//!
//! On the wire a message is a single JSON object whose `type` field names the
//! kind and whose remaining fields are the payload:
//!
//! ```text
//! { "type": "startup", "routes": ["health", "orders"] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reserved message kinds used by the lifecycle protocol.
pub mod kinds {
    /// primary → worker, payload = frozen startup context.
    pub const STARTUP: &str = "startup";
    /// primary → worker, empty payload.
    pub const SHUTDOWN: &str = "shutdown";
    /// worker → primary, empty payload.
    pub const SHUTDOWN_COMPLETE: &str = "shutdown-complete";
    /// worker → primary once its HTTP listener is bound. Not reserved by the
    /// protocol; passed through like any application message.
    pub const LISTENING: &str = "listening";
}

/// Error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("cannot encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("payload field `type` is reserved")]
    ReservedField,

    #[error("peer channel closed")]
    Closed,

    #[error("listener failed: {0}")]
    Listener(String),
}

/// A typed message with an arbitrary key/value payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Message with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Message carrying `payload`.
    pub fn with_payload(kind: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Add a payload field. `type` cannot be used as a field name because it
    /// would collide with the kind on the wire.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, BusError> {
        let key = key.into();
        if key == "type" {
            return Err(BusError::ReservedField);
        }
        self.payload.insert(key, value.into());
        Ok(self)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Serialize into a wire frame.
    pub fn encode(&self) -> Result<String, BusError> {
        if self.payload.contains_key("type") {
            return Err(BusError::ReservedField);
        }
        serde_json::to_string(self).map_err(BusError::Encode)
    }

    /// Parse a wire frame.
    pub fn decode(frame: &str) -> Result<Self, BusError> {
        serde_json::from_str(frame).map_err(BusError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_is_flattened_next_to_type() {
        let message = Message::new(kinds::STARTUP)
            .field("routes", json!(["health", "orders"]))
            .unwrap();

        let frame = message.encode().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "type": "startup", "routes": ["health", "orders"] }));

        assert_eq!(Message::decode(&frame).unwrap(), message);
    }

    #[test]
    fn empty_payload_frame() {
        let frame = Message::new(kinds::SHUTDOWN).encode().unwrap();
        assert_eq!(frame, r#"{"type":"shutdown"}"#);
    }

    #[test]
    fn frame_without_type_is_rejected() {
        assert!(matches!(
            Message::decode(r#"{"routes":[]}"#),
            Err(BusError::Decode(_))
        ));
    }

    #[test]
    fn type_field_is_reserved() {
        assert!(matches!(
            Message::new("app").field("type", "x"),
            Err(BusError::ReservedField)
        ));
    }
}
