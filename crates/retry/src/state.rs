//! Retry state machine.

use serde::{Deserialize, Serialize};

use crate::outcome::OutcomeCode;

/// Lifecycle state of a retry record.
///
/// `Pending` is the only state with outgoing transitions; `Closed` and `Failed`
/// are absorbing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryState {
    Pending,
    Closed,
    Failed,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RetryState::Closed | RetryState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RetryState::Pending => "PENDING",
            RetryState::Closed => "CLOSED",
            RetryState::Failed => "FAILED",
        }
    }

    /// Parse the persisted representation (`PENDING`, `CLOSED`, `FAILED`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RetryState::Pending),
            "CLOSED" => Some(RetryState::Closed),
            "FAILED" => Some(RetryState::Failed),
            _ => None,
        }
    }
}

impl core::fmt::Display for RetryState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table shared by intake and the scheduler.
///
/// `attempt_count` is the count *before* this evaluation. `max_attempts` is the
/// budget; `None` means the caller has no budget to enforce (intake), so a server
/// error always stays pending.
pub fn next_state(outcome: OutcomeCode, attempt_count: u32, max_attempts: Option<u32>) -> RetryState {
    match outcome {
        OutcomeCode::Success => RetryState::Closed,
        OutcomeCode::Conflict => RetryState::Failed,
        OutcomeCode::ServerError => match max_attempts {
            Some(max) if attempt_count.saturating_add(1) >= max => RetryState::Failed,
            _ => RetryState::Pending,
        },
        OutcomeCode::InvalidInput => RetryState::Failed,
    }
}
