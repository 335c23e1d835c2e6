use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use rollcall_infra::policy_store::PolicyStoreError;
use rollcall_infra::retry_store::RetryStoreError;

pub fn retry_store_error_to_response(err: RetryStoreError) -> axum::response::Response {
    match err {
        RetryStoreError::Duplicate { .. } => json_error(StatusCode::CONFLICT, "duplicate", err.to_string()),
        RetryStoreError::Corrupt(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_record", msg),
        RetryStoreError::Storage(msg) => {
            tracing::warn!(error = %msg, "retry store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_error", msg)
        }
    }
}

pub fn policy_store_error_to_response(err: PolicyStoreError) -> axum::response::Response {
    match err {
        PolicyStoreError::Invalid(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        PolicyStoreError::Storage(msg) => {
            tracing::warn!(error = %msg, "policy store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_error", msg)
        }
    }
}

pub fn not_found(what: &'static str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
