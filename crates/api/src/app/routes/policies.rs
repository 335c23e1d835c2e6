use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use rollcall_retry::{RetryPolicy, TaskType};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_policies))
        .route("/:task_type", put(put_policy).get(get_policy))
}

pub async fn list_policies(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.policies.list().await {
        Ok(policies) => Json(policies).into_response(),
        Err(e) => errors::policy_store_error_to_response(e),
    }
}

pub async fn get_policy(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_type): Path<String>,
) -> axum::response::Response {
    match services.policies.get(&TaskType::new(task_type)).await {
        Ok(Some(policy)) => Json(policy).into_response(),
        Ok(None) => errors::not_found("retry policy"),
        Err(e) => errors::policy_store_error_to_response(e),
    }
}

pub async fn put_policy(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_type): Path<String>,
    Json(body): Json<dto::PutPolicyRequest>,
) -> axum::response::Response {
    let policy = match RetryPolicy::new(TaskType::new(task_type), body.max_attempts, body.retry_interval_minutes) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    match services.policies.upsert(policy.clone()).await {
        Ok(()) => {
            tracing::info!(task_type = %policy.task_type, max_attempts = policy.max_attempts, "retry policy updated");
            (StatusCode::OK, Json(policy)).into_response()
        }
        Err(e) => errors::policy_store_error_to_response(e),
    }
}
