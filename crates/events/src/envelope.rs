use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::EventId;

/// Envelope for a published message: transport metadata around the payload.
///
/// - `event_id` is unique per publish; a redelivered message keeps its id.
/// - `topic` routes the message to consumers.
/// - `payload` is the domain-agnostic message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,
    topic: String,
    published_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(topic: impl Into<String>, payload: E) -> Self {
        Self {
            event_id: EventId::new(),
            topic: topic.into(),
            published_at: Utc::now(),
            payload,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_is_stamped_at_publish() {
        let before = Utc::now();
        let envelope = EventEnvelope::new("onboarding.started", 7_u32);
        assert!(envelope.published_at() >= before);
        assert!(envelope.published_at() <= Utc::now());
        assert_eq!(envelope.topic(), "onboarding.started");
        assert_eq!(*envelope.payload(), 7);
    }
}
