use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::errors;
use crate::app::services::AppServices;

/// Trigger one pass now. A pass already in flight wins; this one is skipped.
pub async fn run_now(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.scheduler.run_once().await {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => errors::json_error(
            StatusCode::CONFLICT,
            "pass_in_progress",
            "a scheduler pass is already running",
        ),
    }
}
