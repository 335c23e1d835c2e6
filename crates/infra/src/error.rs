//! Failures while processing a single event or record.
//!
//! All of these are transient from the engine's point of view: the event or
//! record is left as it was and picked up again on the next delivery or tick.

use std::future::Future;
use std::time::Duration;

use rollcall_core::DomainError;

use crate::external::EvaluatorError;
use crate::policy_store::PolicyStoreError;
use crate::retry_store::RetryStoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("record store: {0}")]
    Records(#[from] RetryStoreError),
    #[error("policy store: {0}")]
    Policies(#[from] PolicyStoreError),
    #[error("outcome evaluator: {0}")]
    Evaluator(#[from] EvaluatorError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Run a fallible call under a deadline; an elapsed deadline is a transient failure.
pub async fn with_deadline<T, E, F>(operation: &'static str, after: Duration, call: F) -> Result<T, ProcessingError>
where
    F: Future<Output = Result<T, E>>,
    ProcessingError: From<E>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result.map_err(ProcessingError::from),
        Err(_) => Err(ProcessingError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_a_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, RetryStoreError>(())
        };

        let err = with_deadline("records.get", Duration::from_millis(50), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Timeout { operation: "records.get", .. }));
    }

    #[tokio::test]
    async fn inner_error_is_preserved() {
        let failing = async { Err::<(), _>(RetryStoreError::Storage("down".into())) };
        let err = with_deadline("records.get", Duration::from_secs(1), failing)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Records(RetryStoreError::Storage(_))));
    }
}
