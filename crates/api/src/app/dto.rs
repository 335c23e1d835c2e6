use serde::{Deserialize, Serialize};

use rollcall_retry::RetryState;

use crate::app::errors;

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1_000;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListRecordsQuery {
    pub state: Option<String>,
    pub limit: Option<usize>,
}

impl ListRecordsQuery {
    pub fn state(&self) -> Result<Option<RetryState>, axum::response::Response> {
        match self.state.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => RetryState::parse(&raw.to_ascii_uppercase()).map(Some).ok_or_else(|| {
                errors::json_error(
                    axum::http::StatusCode::BAD_REQUEST,
                    "invalid_state",
                    "state must be one of: PENDING, CLOSED, FAILED",
                )
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutPolicyRequest {
    pub max_attempts: u32,
    pub retry_interval_minutes: u32,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedEvent {
    pub event_id: String,
    pub topic: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatsResponse {
    pub pending: usize,
    pub closed: usize,
    pub failed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(ListRecordsQuery::default().limit(), DEFAULT_LIST_LIMIT);
        let q = ListRecordsQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(q.limit(), 1);
        let q = ListRecordsQuery {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(q.limit(), MAX_LIST_LIMIT);
    }

    #[test]
    fn state_filter_is_case_insensitive() {
        let q = ListRecordsQuery {
            state: Some("pending".into()),
            ..Default::default()
        };
        assert_eq!(q.state().unwrap(), Some(RetryState::Pending));

        let q = ListRecordsQuery {
            state: Some("done".into()),
            ..Default::default()
        };
        assert!(q.state().is_err());
    }
}
