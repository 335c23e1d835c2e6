use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use rollcall_retry::{RetryPolicy, TaskType};

use super::{PolicyStoreError, RetryPolicyStore};

/// In-memory policy store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRetryPolicyStore {
    policies: RwLock<BTreeMap<TaskType, RetryPolicy>>,
}

impl InMemoryRetryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `policies`.
    pub fn with_policies(policies: impl IntoIterator<Item = RetryPolicy>) -> Self {
        let map = policies
            .into_iter()
            .map(|p| (p.task_type.clone(), p))
            .collect();
        Self {
            policies: RwLock::new(map),
        }
    }
}

fn poisoned<T>(_: T) -> PolicyStoreError {
    PolicyStoreError::Storage("policy store lock poisoned".into())
}

#[async_trait]
impl RetryPolicyStore for InMemoryRetryPolicyStore {
    async fn get(&self, task_type: &TaskType) -> Result<Option<RetryPolicy>, PolicyStoreError> {
        Ok(self.policies.read().map_err(poisoned)?.get(task_type).cloned())
    }

    async fn upsert(&self, policy: RetryPolicy) -> Result<(), PolicyStoreError> {
        policy
            .validate()
            .map_err(|e| PolicyStoreError::Invalid(e.to_string()))?;
        self.policies
            .write()
            .map_err(poisoned)?
            .insert(policy.task_type.clone(), policy);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RetryPolicy>, PolicyStoreError> {
        Ok(self.policies.read().map_err(poisoned)?.values().cloned().collect())
    }
}
