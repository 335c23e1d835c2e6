//! Retry record persistence.
//!
//! The store is addressed by record id, by (entity key, task type) and by a
//! due-time range scan. It never deletes records.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rollcall_core::RetryRecordId;
use rollcall_retry::{RetryRecord, RetryState, TaskType};

pub use in_memory::InMemoryRetryRecordStore;
pub use postgres::PostgresRetryRecordStore;

/// Retry record store abstraction.
#[async_trait]
pub trait RetryRecordStore: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, id: RetryRecordId) -> Result<Option<RetryRecord>, RetryStoreError>;

    /// Point lookup by the idempotency key.
    async fn find_by_entity(
        &self,
        entity_key: &str,
        task_type: &TaskType,
    ) -> Result<Option<RetryRecord>, RetryStoreError>;

    /// Atomically create `record` unless one already exists for its
    /// (entity key, task type); the existing record is returned in that case.
    async fn insert_if_absent(&self, record: RetryRecord) -> Result<InsertOutcome, RetryStoreError>;

    /// Insert or replace by id, verbatim.
    ///
    /// Fails with [`RetryStoreError::Duplicate`] when another id already owns the
    /// record's (entity key, task type).
    async fn upsert(&self, record: RetryRecord) -> Result<(), RetryStoreError>;

    /// Replace a stored record only if it is still `PENDING` with
    /// `expected_attempt_count` attempts. Returns `false` when the stored record
    /// moved on (or is gone) and nothing was written.
    async fn replace_pending(
        &self,
        expected_attempt_count: u32,
        record: RetryRecord,
    ) -> Result<bool, RetryStoreError>;

    /// One page of `PENDING` records with `next_eligible_at <= now`, ordered by
    /// (`next_eligible_at`, `id`) and starting strictly after `after`.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> Result<Vec<RetryRecord>, RetryStoreError>;

    /// Records in creation order, optionally filtered by state.
    async fn list(&self, state: Option<RetryState>, limit: usize) -> Result<Vec<RetryRecord>, RetryStoreError>;

    /// Record counts per state.
    async fn stats(&self) -> Result<RetryStats, RetryStoreError>;
}

/// Keyset position in the due ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DueCursor {
    pub next_eligible_at: DateTime<Utc>,
    pub id: RetryRecordId,
}

impl DueCursor {
    pub fn of(record: &RetryRecord) -> Self {
        Self {
            next_eligible_at: record.next_eligible_at,
            id: record.id,
        }
    }
}

/// Result of [`RetryRecordStore::insert_if_absent`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    Existing(RetryRecord),
}

/// Retry store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryStoreError {
    #[error("retry record already exists for entity {entity_key} / task {task_type}")]
    Duplicate { entity_key: String, task_type: String },
    #[error("corrupt retry record: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Record counts per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RetryStats {
    pub pending: usize,
    pub closed: usize,
    pub failed: usize,
}

impl RetryStats {
    pub fn total(&self) -> usize {
        self.pending + self.closed + self.failed
    }

    pub(crate) fn count(&mut self, state: RetryState) {
        match state {
            RetryState::Pending => self.pending += 1,
            RetryState::Closed => self.closed += 1,
            RetryState::Failed => self.failed += 1,
        }
    }
}
