//! Inter-node signal records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Intent,
    Status,
    Completion,
}

/// One message exchanged between nodes. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEvent {
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub node: NodeId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl SignalEvent {
    #[must_use]
    pub fn new(
        event_id: impl Into<EventId>,
        signal_type: SignalType,
        node: impl Into<NodeId>,
        timestamp: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            signal_type,
            node: node.into(),
            timestamp,
            payload,
        }
    }

    /// Shape check applied to records read back from a log.
    ///
    /// Deserialization already enforces field types; this rejects blank
    /// identifiers that would collapse the idempotency index.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.event_id.as_str().trim().is_empty() && !self.node.as_str().trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{SignalEvent, SignalType};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn at_noon() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn wire_names_are_camel_case() {
        let event = SignalEvent::new(
            "evt-1",
            SignalType::Intent,
            "node-a",
            at_noon(),
            json!({"episode": "ep-9"}),
        );
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["eventId"], "evt-1");
        assert_eq!(value["type"], "intent");
        assert_eq!(value["node"], "node-a");
        assert_eq!(value["payload"]["episode"], "ep-9");
    }

    #[test]
    fn blank_ids_are_not_well_formed() {
        let mut event = SignalEvent::new("evt", SignalType::Status, "n", at_noon(), json!(null));
        assert!(event.is_well_formed());
        event.event_id = "  ".into();
        assert!(!event.is_well_formed());
    }

    #[test]
    fn payload_defaults_to_null() {
        let event: SignalEvent = serde_json::from_value(json!({
            "eventId": "e",
            "type": "completion",
            "node": "n",
            "timestamp": "2026-05-04T12:00:00Z"
        }))
        .expect("deserialize");
        assert!(event.payload.is_null());
        assert_eq!(event.signal_type, SignalType::Completion);
    }
}
