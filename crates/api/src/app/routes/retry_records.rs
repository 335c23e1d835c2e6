use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use rollcall_core::RetryRecordId;
use rollcall_retry::RetryRecord;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_records).post(put_record))
        .route("/stats", get(record_stats))
        .route("/:id", get(get_record))
}

pub async fn list_records(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListRecordsQuery>,
) -> axum::response::Response {
    let state = match query.state() {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.records.list(state, query.limit()).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::retry_store_error_to_response(e),
    }
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RetryRecordId = match id.parse() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "id must be a UUID"),
    };

    match services.records.get(id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => errors::not_found("retry record"),
        Err(e) => errors::retry_store_error_to_response(e),
    }
}

pub async fn record_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.records.stats().await {
        Ok(stats) => Json(dto::RecordStatsResponse {
            pending: stats.pending,
            closed: stats.closed,
            failed: stats.failed,
            total: stats.total(),
        })
        .into_response(),
        Err(e) => errors::retry_store_error_to_response(e),
    }
}

/// Administrative seeding: store a fully-formed record verbatim.
///
/// Skips the intake gate and the evaluator, but not the store's
/// one-record-per-entity rule.
pub async fn put_record(
    Extension(services): Extension<Arc<AppServices>>,
    Json(record): Json<RetryRecord>,
) -> axum::response::Response {
    if record.entity_key.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "entityKey must not be empty");
    }

    let id = record.id;
    match services.records.upsert(record.clone()).await {
        Ok(()) => {
            tracing::info!(record_id = %id, state = %record.state, "retry record seeded manually");
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => errors::retry_store_error_to_response(e),
    }
}
