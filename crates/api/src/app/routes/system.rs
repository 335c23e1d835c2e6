use std::sync::Arc;

use axum::{Json, extract::Extension};
use serde_json::{Value, json};

use crate::app::services::AppServices;

/// Liveness plus the store backend the process was started with.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<Value> {
    Json(json!({ "status": "ok", "backend": services.backend }))
}
