//! Per-stream event buffers for the active recording

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::bus::Notification;

/// Raw frame; routed to the video writer instead
pub const FRAME_STREAM: &str = "frame";
/// Per-cycle timing delta; transient
pub const DT_STREAM: &str = "dt";
/// Recordable bus notifications
pub const NOTIFICATIONS_STREAM: &str = "notifications";

/// Streams that never reach the persisted data file
pub const RESERVED_STREAMS: [&str; 2] = [DT_STREAM, FRAME_STREAM];

/// Streams present in every data file, even when empty
const DEFAULT_STREAMS: [&str; 3] = ["pupil_positions", "gaze_positions", NOTIFICATIONS_STREAM];

/// Buffers named event streams, preserving arrival order per stream
///
/// Buffers grow for the whole session; nothing is flushed before stop.
#[derive(Debug, Clone)]
pub struct EventAggregator {
    streams: BTreeMap<String, Vec<Value>>,
}

impl EventAggregator {
    pub fn new() -> Self {
        let mut aggregator = Self {
            streams: BTreeMap::new(),
        };
        aggregator.reset();
        aggregator
    }

    /// Append items to a stream, creating it on first use
    ///
    /// Returns `false` (and stores nothing) for reserved stream names.
    pub fn ingest(&mut self, name: &str, items: Vec<Value>) -> bool {
        if is_reserved(name) {
            debug!("Not buffering reserved stream {:?}", name);
            return false;
        }
        self.streams.entry(name.to_string()).or_default().extend(items);
        true
    }

    /// Append a recordable notification, which must carry a numeric timestamp
    pub fn ingest_notification(&mut self, notification: &Notification) -> bool {
        if notification.timestamp().is_none() {
            error!(
                "Notification {:?} without timestamp will not be saved.",
                notification.subject()
            );
            return false;
        }
        self.streams
            .entry(NOTIFICATIONS_STREAM.to_string())
            .or_default()
            .push(notification.clone().into_value());
        true
    }

    /// Current buffers, keyed by stream name
    pub fn snapshot(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.streams
    }

    pub fn stream(&self, name: &str) -> Option<&[Value]> {
        self.streams.get(name).map(Vec::as_slice)
    }

    /// Total number of buffered items across all streams
    pub fn len(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every buffer and start over with the default empty streams
    pub fn reset(&mut self) {
        self.streams.clear();
        for name in DEFAULT_STREAMS {
            self.streams.insert(name.to_string(), Vec::new());
        }
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_STREAMS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preserves_arrival_order_per_stream() {
        let mut aggregator = EventAggregator::new();
        aggregator.ingest("gaze_positions", vec![json!(1), json!(2)]);
        aggregator.ingest("blinks", vec![json!("a")]);
        aggregator.ingest("gaze_positions", vec![json!(3)]);

        assert_eq!(
            aggregator.stream("gaze_positions").unwrap(),
            &[json!(1), json!(2), json!(3)]
        );
        assert_eq!(aggregator.stream("blinks").unwrap(), &[json!("a")]);
        assert_eq!(aggregator.len(), 4);
    }

    #[test]
    fn test_reserved_streams_are_not_created() {
        let mut aggregator = EventAggregator::new();
        assert!(!aggregator.ingest(FRAME_STREAM, vec![json!({"index": 0})]));
        assert!(!aggregator.ingest(DT_STREAM, vec![json!(0.033)]));

        assert!(!aggregator.snapshot().contains_key(FRAME_STREAM));
        assert!(!aggregator.snapshot().contains_key(DT_STREAM));
    }

    #[test]
    fn test_notification_without_timestamp_is_dropped() {
        let mut aggregator = EventAggregator::new();
        let missing = Notification::new("annotation").with("record", true);
        let first = Notification::new("annotation").with("record", true).with("timestamp", 1.0);
        let second = Notification::new("annotation").with("record", true).with("timestamp", 2.0);

        assert!(aggregator.ingest_notification(&first));
        assert!(!aggregator.ingest_notification(&missing));
        assert!(aggregator.ingest_notification(&second));

        let stored = aggregator.stream(NOTIFICATIONS_STREAM).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["timestamp"], json!(1.0));
        assert_eq!(stored[1]["timestamp"], json!(2.0));
    }

    #[test]
    fn test_reset_restores_default_streams() {
        let mut aggregator = EventAggregator::new();
        aggregator.ingest("pupil_positions", vec![json!(1)]);
        aggregator.ingest("custom", vec![json!(1)]);

        aggregator.reset();

        assert!(aggregator.is_empty());
        assert!(!aggregator.snapshot().contains_key("custom"));
        let keys: Vec<&str> = aggregator.snapshot().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["gaze_positions", "notifications", "pupil_positions"]);
    }
}
