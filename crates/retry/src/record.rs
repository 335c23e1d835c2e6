//! Retry record and its transitions.
//!
//! Records are values: every transition returns a new [`RetryRecord`] that fully
//! replaces the stored one. Nothing mutates a record in place.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::{DomainError, DomainResult, RetryRecordId};

use crate::outcome::OutcomeCode;
use crate::policy::RetryPolicy;
use crate::state::{RetryState, next_state};
use crate::task::TaskType;

/// One retryable unit of work per (entity key, task type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRecord {
    pub id: RetryRecordId,
    pub entity_key: String,
    pub task_type: TaskType,
    /// Original input, captured once for replay/audit.
    pub request_payload: serde_json::Value,
    /// Most recent outcome; overwritten on every attempt.
    pub response_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub next_eligible_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub state: RetryState,
}

impl RetryRecord {
    /// Build the initial record for a first-seen entity.
    ///
    /// The attempt count starts at 0 and the budget is not enforced here, so a
    /// server error always yields `Pending`. Fails when `now + initial_delay`
    /// leaves the representable time range.
    pub fn open(
        entity_key: impl Into<String>,
        task_type: TaskType,
        request_payload: serde_json::Value,
        outcome: OutcomeCode,
        now: DateTime<Utc>,
        initial_delay: Duration,
    ) -> DomainResult<Self> {
        let next_eligible_at = eligible_after(now, initial_delay)?;
        Ok(Self {
            id: RetryRecordId::new(),
            entity_key: entity_key.into(),
            task_type,
            request_payload,
            response_payload: outcome_payload(outcome, now),
            created_at: now,
            last_attempt_at: now,
            next_eligible_at,
            attempt_count: 0,
            state: next_state(outcome, 0, None),
        })
    }

    /// Apply one scheduler evaluation and return the replacement record.
    ///
    /// The transition uses the attempt count *before* incrementing. Terminal
    /// records cannot be evaluated again.
    pub fn evaluated(&self, outcome: OutcomeCode, policy: &RetryPolicy, now: DateTime<Utc>) -> DomainResult<Self> {
        if self.state.is_terminal() {
            return Err(DomainError::invariant(format!(
                "retry record {} is already {}",
                self.id, self.state
            )));
        }

        let state = next_state(outcome, self.attempt_count, Some(policy.max_attempts));
        let next_eligible_at = if state == RetryState::Pending {
            eligible_after(now, policy.retry_interval())?
        } else {
            self.next_eligible_at
        };

        Ok(Self {
            response_payload: outcome_payload(outcome, now),
            last_attempt_at: now,
            next_eligible_at,
            attempt_count: self.attempt_count.saturating_add(1),
            state,
            ..self.clone()
        })
    }

    /// Whether the scheduler should pick this record up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == RetryState::Pending && self.next_eligible_at <= now
    }

    /// Outcome recorded by the most recent attempt, if the payload carries one.
    pub fn last_outcome(&self) -> Option<OutcomeCode> {
        serde_json::from_value(self.response_payload.get("outcome")?.clone()).ok()
    }
}

fn eligible_after(now: DateTime<Utc>, delay: Duration) -> DomainResult<DateTime<Utc>> {
    now.checked_add_signed(delay)
        .ok_or_else(|| DomainError::validation(format!("{now} + {delay} is out of range")))
}

/// Response payload stored for an outcome.
pub fn outcome_payload(outcome: OutcomeCode, at: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "status": outcome.status_code(),
        "outcome": outcome,
        "evaluatedAt": at,
    })
}
