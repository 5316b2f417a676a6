//! Startup context handed to every worker.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::bus::{kinds, BusError, Message};

/// Payload of the `startup` message, filled in before the pool is spawned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupContext {
    entries: Map<String, Value>,
}

impl StartupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary entry. `type` is rejected when the context is frozen.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Set the route module names workers load.
    pub fn set_routes<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<Value> = names.into_iter().map(|n| Value::String(n.into())).collect();
        self.insert("routes", Value::Array(names))
    }

    /// Route names currently set, string entries only.
    pub fn routes(&self) -> Vec<String> {
        self.entries
            .get("routes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Encode the context once into the `startup` frame.
    pub fn freeze(&self) -> Result<FrozenContext, BusError> {
        let frame = Message::with_payload(kinds::STARTUP, self.entries.clone()).encode()?;
        Ok(FrozenContext {
            entries: self.entries.clone(),
            frame: Arc::from(frame),
        })
    }
}

/// Immutable startup context plus its encoded frame.
#[derive(Debug, Clone)]
pub struct FrozenContext {
    entries: Map<String, Value>,
    frame: Arc<str>,
}

impl FrozenContext {
    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// The encoded `startup` frame every worker receives.
    pub fn frame(&self) -> &str {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frozen_frame_carries_every_entry() {
        let mut context = StartupContext::new();
        context.set_routes(["health", "orders"]).insert("region", "eu-west-1");

        let frozen = context.freeze().unwrap();
        let value: Value = serde_json::from_str(frozen.frame()).unwrap();
        assert_eq!(
            value,
            json!({ "type": "startup", "routes": ["health", "orders"], "region": "eu-west-1" })
        );
        assert_eq!(context.routes(), vec!["health", "orders"]);
    }

    #[test]
    fn reserved_key_fails_to_freeze() {
        let mut context = StartupContext::new();
        context.insert("type", "oops");
        assert!(matches!(context.freeze(), Err(BusError::ReservedField)));
    }
}
