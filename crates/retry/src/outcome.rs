//! Outcome codes and the placeholder decision rule.

use serde::{Deserialize, Serialize};

/// Result of attempting the underlying operation (an HTTP status analog).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    Success,
    Conflict,
    ServerError,
    InvalidInput,
}

impl OutcomeCode {
    /// HTTP status this outcome stands for.
    pub fn status_code(self) -> u16 {
        match self {
            OutcomeCode::Success => 200,
            OutcomeCode::Conflict => 409,
            OutcomeCode::ServerError => 500,
            OutcomeCode::InvalidInput => 400,
        }
    }

    /// Classify a real HTTP status.
    ///
    /// Anything that is not a success, a conflict or a server error fails closed
    /// as `InvalidInput`.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => OutcomeCode::Success,
            409 => OutcomeCode::Conflict,
            500..=599 => OutcomeCode::ServerError,
            _ => OutcomeCode::InvalidInput,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeCode::Success => "SUCCESS",
            OutcomeCode::Conflict => "CONFLICT",
            OutcomeCode::ServerError => "SERVER_ERROR",
            OutcomeCode::InvalidInput => "INVALID_INPUT",
        }
    }
}

impl core::fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated external call: decide from the last character of `key`.
///
/// `'0'` succeeds, `'1'` conflicts, `'2'` is a server error, anything else
/// (including the empty key) is invalid input. Total and deterministic.
pub fn decide_by_last_digit(key: &str) -> OutcomeCode {
    match key.chars().last() {
        Some('0') => OutcomeCode::Success,
        Some('1') => OutcomeCode::Conflict,
        Some('2') => OutcomeCode::ServerError,
        _ => OutcomeCode::InvalidInput,
    }
}
