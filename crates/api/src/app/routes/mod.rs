use axum::{Router, routing::post};

pub mod onboarding;
pub mod policies;
pub mod retry_records;
pub mod scheduler;
pub mod system;

/// Router for all engine endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/onboarding", post(onboarding::publish))
        .route("/scheduler/run", post(scheduler::run_now))
        .nest("/retry-records", retry_records::router())
        .nest("/retry-policies", policies::router())
}
