//! Per-task-type retry policy.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use rollcall_core::{DomainError, DomainResult};

use crate::task::TaskType;

/// Both counters are stored as SQL `INTEGER`.
const MAX_POLICY_VALUE: u32 = i32::MAX as u32;

/// Retry budget and cadence for one task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub task_type: TaskType,
    /// Ceiling on `attempt_count` before a server error becomes terminal (>= 1).
    pub max_attempts: u32,
    /// Delay before the next scheduler evaluation of a still-pending record.
    pub retry_interval_minutes: u32,
}

impl RetryPolicy {
    pub fn new(task_type: TaskType, max_attempts: u32, retry_interval_minutes: u32) -> DomainResult<Self> {
        let policy = Self {
            task_type,
            max_attempts,
            retry_interval_minutes,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check invariants on a policy that arrived from outside (JSON, SQL row).
    pub fn validate(&self) -> DomainResult<()> {
        if self.max_attempts == 0 {
            return Err(DomainError::validation("max_attempts must be at least 1"));
        }
        if self.max_attempts > MAX_POLICY_VALUE {
            return Err(DomainError::validation(format!("max_attempts must be at most {MAX_POLICY_VALUE}")));
        }
        if self.retry_interval_minutes > MAX_POLICY_VALUE {
            return Err(DomainError::validation(format!(
                "retry_interval_minutes must be at most {MAX_POLICY_VALUE}"
            )));
        }
        if self.task_type.as_str().trim().is_empty() {
            return Err(DomainError::validation("task_type must not be empty"));
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.retry_interval_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_budget() {
        let err = RetryPolicy::new(TaskType::onboarding(), 0, 5).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_values_beyond_integer_column() {
        let limit = i32::MAX as u32;
        assert!(RetryPolicy::new(TaskType::onboarding(), limit, limit).is_ok());
        assert!(RetryPolicy::new(TaskType::onboarding(), limit + 1, 5).is_err());
        assert!(RetryPolicy::new(TaskType::onboarding(), 3, limit + 1).is_err());
    }

    #[test]
    fn rejects_blank_task_type() {
        assert!(RetryPolicy::new(TaskType::new("  "), 3, 5).is_err());
    }

    #[test]
    fn interval_in_minutes() {
        let policy = RetryPolicy::new(TaskType::onboarding(), 3, 7).unwrap();
        assert_eq!(policy.retry_interval(), Duration::minutes(7));
    }

    #[test]
    fn wire_shape() {
        let policy: RetryPolicy = serde_json::from_value(serde_json::json!({
            "taskType": "ONBOARDING",
            "maxAttempts": 3,
            "retryIntervalMinutes": 10,
        }))
        .unwrap();
        assert_eq!(policy.task_type, TaskType::onboarding());
        assert_eq!(policy.max_attempts, 3);
    }
}
