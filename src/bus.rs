//! Notification bus messages
//!
//! Notifications are loosely-typed dictionaries keyed by a `subject`. The
//! recorder listens for start/stop requests and for any message flagged
//! `record: true`, and emits lifecycle events of its own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::debug;

/// Request to start a recording, optional `session_name`
pub const SHOULD_START: &str = "recording.should_start";
/// Request to stop the current recording
pub const SHOULD_STOP: &str = "recording.should_stop";
/// Emitted once a recording has started
pub const STARTED: &str = "recording.started";
/// Emitted once a recording has been finalized
pub const STOPPED: &str = "recording.stopped";
/// Subject of the calibration snapshot injected at start
pub const CALIBRATION_DATA: &str = "calibration.calibration_data";

/// A single bus message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notification(Map<String, Value>);

impl Notification {
    /// Create a notification with the given subject
    pub fn new(subject: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("subject".to_string(), Value::String(subject.into()));
        Self(fields)
    }

    /// Wrap an existing field map
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Add or replace a field
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Subject string, empty if absent
    pub fn subject(&self) -> &str {
        self.0.get("subject").and_then(Value::as_str).unwrap_or("")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the sender asked for this message to be persisted
    pub fn is_recordable(&self) -> bool {
        matches!(self.0.get("record"), Some(Value::Bool(true)))
    }

    /// Numeric timestamp, if present
    pub fn timestamp(&self) -> Option<f64> {
        self.0.get("timestamp").and_then(Value::as_f64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Publish side of the notification bus
pub trait NotificationBus: Send + Sync {
    /// Deliver a notification to every subscriber
    fn notify_all(&self, notification: Notification);
}

/// In-process bus backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all notifications published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationBus for BroadcastBus {
    fn notify_all(&self, notification: Notification) {
        debug!("Bus: {}", notification.subject());
        // No subscribers is not an error
        let _ = self.tx.send(notification);
    }
}
