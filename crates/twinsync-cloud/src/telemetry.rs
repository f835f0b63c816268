//! Device-to-cloud message payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::event::PendingEvent;

/// A single telemetry reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Telemetry {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
}

impl Telemetry {
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }
}

/// Message announcing a pending event: `{"<EventName>": true}`.
pub fn event_message(event: PendingEvent) -> Value {
    let mut root = Map::new();
    root.insert(event.name().to_string(), Value::Bool(true));
    Value::Object(root)
}

/// Message announcing that the device was moved.
pub fn thermometer_moved_message() -> Value {
    json!({ "thermometerMoved": true })
}
