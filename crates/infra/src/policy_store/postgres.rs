//! Postgres-backed policy store (`retry_policies` table).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use rollcall_retry::{RetryPolicy, TaskType};

use super::{PolicyStoreError, RetryPolicyStore};

#[derive(Debug, Clone)]
pub struct PostgresRetryPolicyStore {
    pool: Arc<PgPool>,
}

impl PostgresRetryPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl RetryPolicyStore for PostgresRetryPolicyStore {
    #[instrument(skip(self), err)]
    async fn get(&self, task_type: &TaskType) -> Result<Option<RetryPolicy>, PolicyStoreError> {
        let row = sqlx::query(
            "SELECT task_type, max_attempts, retry_interval_minutes FROM retry_policies WHERE task_type = $1",
        )
        .bind(task_type.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage("get", e))?;

        row.as_ref().map(policy_from_row).transpose()
    }

    #[instrument(skip(self, policy), fields(task_type = %policy.task_type), err)]
    async fn upsert(&self, policy: RetryPolicy) -> Result<(), PolicyStoreError> {
        policy
            .validate()
            .map_err(|e| PolicyStoreError::Invalid(e.to_string()))?;

        let max_attempts = i32::try_from(policy.max_attempts)
            .map_err(|_| PolicyStoreError::Invalid("max_attempts out of range".into()))?;
        let interval = i32::try_from(policy.retry_interval_minutes)
            .map_err(|_| PolicyStoreError::Invalid("retry_interval_minutes out of range".into()))?;

        sqlx::query(
            r#"
            INSERT INTO retry_policies (task_type, max_attempts, retry_interval_minutes)
            VALUES ($1, $2, $3)
            ON CONFLICT (task_type) DO UPDATE SET
                max_attempts = EXCLUDED.max_attempts,
                retry_interval_minutes = EXCLUDED.retry_interval_minutes
            "#,
        )
        .bind(policy.task_type.as_str())
        .bind(max_attempts)
        .bind(interval)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage("upsert", e))?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<RetryPolicy>, PolicyStoreError> {
        let rows = sqlx::query(
            "SELECT task_type, max_attempts, retry_interval_minutes FROM retry_policies ORDER BY task_type",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage("list", e))?;

        rows.iter().map(policy_from_row).collect()
    }
}

fn policy_from_row(row: &PgRow) -> Result<RetryPolicy, PolicyStoreError> {
    let task_type: String = row.try_get("task_type").map_err(|e| storage("decode", e))?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(|e| storage("decode", e))?;
    let interval: i32 = row
        .try_get("retry_interval_minutes")
        .map_err(|e| storage("decode", e))?;

    policy_from_columns(task_type, max_attempts, interval)
}

fn policy_from_columns(task_type: String, max_attempts: i32, interval: i32) -> Result<RetryPolicy, PolicyStoreError> {
    let policy = RetryPolicy {
        task_type: TaskType::new(task_type),
        max_attempts: u32::try_from(max_attempts)
            .map_err(|_| PolicyStoreError::Invalid(format!("stored max_attempts {max_attempts} is negative")))?,
        retry_interval_minutes: u32::try_from(interval)
            .map_err(|_| PolicyStoreError::Invalid(format!("stored retry_interval_minutes {interval} is negative")))?,
    };
    policy
        .validate()
        .map_err(|e| PolicyStoreError::Invalid(e.to_string()))?;
    Ok(policy)
}

fn storage(operation: &str, err: sqlx::Error) -> PolicyStoreError {
    PolicyStoreError::Storage(format!("sqlx error in {}: {}", operation, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_columns_are_invalid() {
        assert!(matches!(
            policy_from_columns("ONBOARDING".into(), 3, -5),
            Err(PolicyStoreError::Invalid(_))
        ));
        assert!(matches!(
            policy_from_columns("ONBOARDING".into(), -1, 5),
            Err(PolicyStoreError::Invalid(_))
        ));
        assert!(matches!(
            policy_from_columns("ONBOARDING".into(), 0, 5),
            Err(PolicyStoreError::Invalid(_))
        ));
    }

    #[test]
    fn zero_interval_is_kept() {
        let policy = policy_from_columns("ONBOARDING".into(), 3, 0).unwrap();
        assert_eq!(policy.retry_interval_minutes, 0);
        assert_eq!(policy.max_attempts, 3);
    }
}
