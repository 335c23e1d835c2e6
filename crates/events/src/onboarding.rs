//! Inbound onboarding message.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Topic carrying [`OnboardingEvent`]s.
pub const ONBOARDING_TOPIC: &str = "student.onboarding";

/// A student-onboarding event as it arrives on the transport.
///
/// `entity_key` identifies the student and is the idempotency key (together with
/// the task type the consumer assigns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingEvent {
    pub entity_key: String,
    pub roll_no: String,
    pub name: String,
    pub student_class: String,
    pub school: String,
    pub dob: NaiveDate,
}

impl OnboardingEvent {
    /// The event as an opaque JSON mapping (captured verbatim on the retry record).
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}
