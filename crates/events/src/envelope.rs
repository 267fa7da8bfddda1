use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Envelope for an event, carrying routing metadata next to the payload.
///
/// This is the unit handed to notifiers / webhook sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    event_version: u32,

    aggregate_id: Uuid,
    aggregate_type: String,

    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        event_version: u32,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            event_version,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, copying its type/version/time metadata.
    pub fn wrap(aggregate_id: Uuid, aggregate_type: impl Into<String>, event: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            event.event_type(),
            event.version(),
            aggregate_id,
            aggregate_type,
            event.occurred_at(),
            event,
        )
    }
}

impl<E: Serialize> EventEnvelope<E> {
    /// Serialize the payload, keeping the metadata (wire form for webhooks).
    pub fn to_json(&self) -> Result<EventEnvelope<serde_json::Value>, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            event_version: self.event_version,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type.clone(),
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Pinged {
        at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            2
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_event_metadata() {
        let at = Utc::now();
        let aggregate_id = Uuid::now_v7();
        let env = EventEnvelope::wrap(aggregate_id, "ping", Pinged { at });

        assert_eq!(env.event_type(), "test.pinged");
        assert_eq!(env.event_version(), 2);
        assert_eq!(env.aggregate_id(), aggregate_id);
        assert_eq!(env.aggregate_type(), "ping");
        assert_eq!(env.occurred_at(), at);
    }

    #[test]
    fn to_json_keeps_envelope_identity() {
        let env = EventEnvelope::wrap(Uuid::now_v7(), "ping", Pinged { at: Utc::now() });
        let json = env.to_json().unwrap();

        assert_eq!(json.event_id(), env.event_id());
        assert_eq!(json.event_type(), "test.pinged");
        assert!(json.payload().get("at").is_some());
    }
}
