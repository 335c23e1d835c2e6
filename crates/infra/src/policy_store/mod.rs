//! Retry policy lookup (task type → budget and cadence).

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;

use rollcall_retry::{RetryPolicy, TaskType};

pub use in_memory::InMemoryRetryPolicyStore;
pub use postgres::PostgresRetryPolicyStore;

#[async_trait]
pub trait RetryPolicyStore: Send + Sync {
    async fn get(&self, task_type: &TaskType) -> Result<Option<RetryPolicy>, PolicyStoreError>;

    /// Insert or replace the policy for its task type.
    async fn upsert(&self, policy: RetryPolicy) -> Result<(), PolicyStoreError>;

    /// All policies, ordered by task type.
    async fn list(&self) -> Result<Vec<RetryPolicy>, PolicyStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyStoreError {
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("storage error: {0}")]
    Storage(String),
}
