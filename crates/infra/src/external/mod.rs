//! External collaborators: the outcome evaluator capability.
//!
//! The engine only needs "given a key, what happened when we tried?". The
//! last-digit evaluator simulates the enrollment system; the HTTP evaluator
//! calls a real one.

pub mod http;
pub mod last_digit;

use async_trait::async_trait;

use rollcall_retry::OutcomeCode;

pub use http::HttpOutcomeEvaluator;
pub use last_digit::LastDigitEvaluator;

/// Capability boundary for attempting the underlying operation.
///
/// Implementations must be safe to call concurrently. An `Err` means the
/// attempt could not be made (transient) and no state transition happens.
#[async_trait]
pub trait OutcomeEvaluator: Send + Sync {
    async fn evaluate(&self, key: &str) -> Result<OutcomeCode, EvaluatorError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluatorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
}
