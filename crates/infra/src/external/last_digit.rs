use async_trait::async_trait;

use rollcall_retry::{OutcomeCode, decide_by_last_digit};

use super::{EvaluatorError, OutcomeEvaluator};

/// Simulated enrollment system: the key's last digit decides the outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastDigitEvaluator;

#[async_trait]
impl OutcomeEvaluator for LastDigitEvaluator {
    async fn evaluate(&self, key: &str) -> Result<OutcomeCode, EvaluatorError> {
        Ok(decide_by_last_digit(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_same_outcome() {
        let evaluator = LastDigitEvaluator;
        for key in ["STU-100", "STU-101", "STU-102", "STU-10x"] {
            let first = evaluator.evaluate(key).await.unwrap();
            let second = evaluator.evaluate(key).await.unwrap();
            assert_eq!(first, second);
        }
        assert_eq!(evaluator.evaluate("STU-102").await.unwrap(), OutcomeCode::ServerError);
    }
}
