use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use rollcall_events::{EventBus, EventEnvelope, ONBOARDING_TOPIC, OnboardingEvent};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Producer side of the demo: put an onboarding event on the bus.
///
/// Accepted is all this promises; the record appears once the consumer has
/// handled the event.
pub async fn publish(
    Extension(services): Extension<Arc<AppServices>>,
    Json(event): Json<OnboardingEvent>,
) -> axum::response::Response {
    if event.entity_key.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "entityKey must not be empty");
    }

    let envelope = EventEnvelope::new(ONBOARDING_TOPIC, event);
    let event_id = envelope.event_id();

    if let Err(e) = services.bus.publish(envelope) {
        return errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "publish_error", format!("{e:?}"));
    }

    (
        StatusCode::ACCEPTED,
        Json(dto::AcceptedEvent {
            event_id: event_id.to_string(),
            topic: ONBOARDING_TOPIC,
        }),
    )
        .into_response()
}
