//! In-memory retry record store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rollcall_core::RetryRecordId;
use rollcall_retry::{RetryRecord, RetryState, TaskType};

use super::{DueCursor, InsertOutcome, RetryRecordStore, RetryStats, RetryStoreError};

type EntityIndexKey = (String, TaskType);

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<RetryRecordId, RetryRecord>,
    by_entity: HashMap<EntityIndexKey, RetryRecordId>,
}

/// In-memory store; the (entity key, task type) index doubles as the
/// uniqueness constraint.
#[derive(Debug, Default)]
pub struct InMemoryRetryRecordStore {
    inner: RwLock<Inner>,
}

impl InMemoryRetryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, RetryStoreError> {
        self.inner
            .read()
            .map_err(|_| RetryStoreError::Storage("retry store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, RetryStoreError> {
        self.inner
            .write()
            .map_err(|_| RetryStoreError::Storage("retry store lock poisoned".into()))
    }
}

fn index_key(record: &RetryRecord) -> EntityIndexKey {
    (record.entity_key.clone(), record.task_type.clone())
}

#[async_trait]
impl RetryRecordStore for InMemoryRetryRecordStore {
    async fn get(&self, id: RetryRecordId) -> Result<Option<RetryRecord>, RetryStoreError> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    async fn find_by_entity(
        &self,
        entity_key: &str,
        task_type: &TaskType,
    ) -> Result<Option<RetryRecord>, RetryStoreError> {
        let inner = self.read()?;
        let key = (entity_key.to_string(), task_type.clone());
        Ok(inner
            .by_entity
            .get(&key)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn insert_if_absent(&self, record: RetryRecord) -> Result<InsertOutcome, RetryStoreError> {
        let mut inner = self.write()?;
        let key = index_key(&record);

        if let Some(existing) = inner.by_entity.get(&key).and_then(|id| inner.records.get(id)) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        inner.by_entity.insert(key, record.id);
        inner.records.insert(record.id, record);
        Ok(InsertOutcome::Inserted)
    }

    async fn upsert(&self, record: RetryRecord) -> Result<(), RetryStoreError> {
        let mut inner = self.write()?;
        let key = index_key(&record);

        if let Some(owner) = inner.by_entity.get(&key) {
            if *owner != record.id {
                return Err(RetryStoreError::Duplicate {
                    entity_key: record.entity_key.clone(),
                    task_type: record.task_type.to_string(),
                });
            }
        }

        // The id may be re-keyed to a different entity; drop its old index entry.
        if let Some(previous) = inner.records.get(&record.id) {
            let old_key = index_key(previous);
            if old_key != key {
                inner.by_entity.remove(&old_key);
            }
        }

        inner.by_entity.insert(key, record.id);
        inner.records.insert(record.id, record);
        Ok(())
    }

    async fn replace_pending(
        &self,
        expected_attempt_count: u32,
        record: RetryRecord,
    ) -> Result<bool, RetryStoreError> {
        let mut inner = self.write()?;

        let still_current = inner.records.get(&record.id).is_some_and(|current| {
            current.state == RetryState::Pending && current.attempt_count == expected_attempt_count
        });
        if !still_current {
            return Ok(false);
        }

        inner.records.insert(record.id, record);
        Ok(true)
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> Result<Vec<RetryRecord>, RetryStoreError> {
        let inner = self.read()?;
        let mut due: Vec<_> = inner
            .records
            .values()
            .filter(|r| r.is_due(now) && after.is_none_or(|cursor| DueCursor::of(r) > cursor))
            .cloned()
            .collect();

        due.sort_by_key(DueCursor::of);
        due.truncate(limit);
        Ok(due)
    }

    async fn list(&self, state: Option<RetryState>, limit: usize) -> Result<Vec<RetryRecord>, RetryStoreError> {
        let inner = self.read()?;
        let mut result: Vec<_> = inner
            .records
            .values()
            .filter(|r| state.map_or(true, |s| r.state == s))
            .cloned()
            .collect();

        result.sort_by_key(|r| (r.created_at, r.id));
        result.truncate(limit);
        Ok(result)
    }

    async fn stats(&self) -> Result<RetryStats, RetryStoreError> {
        let inner = self.read()?;
        let mut stats = RetryStats::default();
        for record in inner.records.values() {
            stats.count(record.state);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rollcall_retry::{OutcomeCode, RetryPolicy};

    use super::*;

    fn record(key: &str, outcome: OutcomeCode, now: DateTime<Utc>) -> RetryRecord {
        RetryRecord::open(
            key,
            TaskType::onboarding(),
            serde_json::json!({ "entityKey": key }),
            outcome,
            now,
            Duration::zero(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_first_record() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        let first = record("STU-2", OutcomeCode::ServerError, now);
        let second = record("STU-2", OutcomeCode::ServerError, now);

        assert_eq!(store.insert_if_absent(first.clone()).await.unwrap(), InsertOutcome::Inserted);
        match store.insert_if_absent(second).await.unwrap() {
            InsertOutcome::Existing(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected existing record, got {other:?}"),
        }

        assert_eq!(store.stats().await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn same_entity_different_task_is_distinct() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        let onboarding = record("STU-2", OutcomeCode::ServerError, now);
        let mut billing = record("STU-2", OutcomeCode::ServerError, now);
        billing.task_type = TaskType::new("BILLING");

        store.insert_if_absent(onboarding).await.unwrap();
        assert_eq!(store.insert_if_absent(billing).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn upsert_rejects_foreign_duplicate() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        store.upsert(record("STU-2", OutcomeCode::ServerError, now)).await.unwrap();
        let err = store
            .upsert(record("STU-2", OutcomeCode::Success, now))
            .await
            .unwrap_err();
        assert!(matches!(err, RetryStoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_reindexes() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        let mut rec = record("STU-2", OutcomeCode::ServerError, now);
        store.upsert(rec.clone()).await.unwrap();

        rec.entity_key = "STU-3".into();
        store.upsert(rec.clone()).await.unwrap();

        let task = TaskType::onboarding();
        assert!(store.find_by_entity("STU-2", &task).await.unwrap().is_none());
        assert_eq!(store.find_by_entity("STU-3", &task).await.unwrap().unwrap().id, rec.id);
    }

    #[tokio::test]
    async fn list_due_excludes_terminal_and_future() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        let due = record("STU-2", OutcomeCode::ServerError, now - Duration::minutes(1));
        let mut future = record("STU-12", OutcomeCode::ServerError, now);
        future.next_eligible_at = now + Duration::minutes(5);
        let closed = record("STU-10", OutcomeCode::Success, now - Duration::minutes(1));
        let failed = record("STU-11", OutcomeCode::Conflict, now - Duration::minutes(1));

        for r in [due.clone(), future, closed, failed] {
            store.insert_if_absent(r).await.unwrap();
        }

        let listed = store.list_due(now, None, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, due.id);
    }

    #[tokio::test]
    async fn list_due_respects_limit_and_order() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        for i in 0..5 {
            let mut r = record(&format!("STU-{i}2"), OutcomeCode::ServerError, now);
            r.next_eligible_at = now - Duration::minutes(i);
            store.insert_if_absent(r).await.unwrap();
        }

        let listed = store.list_due(now, None, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].next_eligible_at <= listed[1].next_eligible_at);
        assert_eq!(listed[0].entity_key, "STU-42");
    }

    #[tokio::test]
    async fn list_due_pages_by_cursor() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        for i in 0..5 {
            let mut r = record(&format!("STU-{i}2"), OutcomeCode::ServerError, now);
            r.next_eligible_at = now - Duration::minutes(i);
            store.insert_if_absent(r).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.list_due(now, cursor, 2).await.unwrap();
            let Some(last) = page.last() else { break };
            cursor = Some(DueCursor::of(last));
            seen.extend(page.into_iter().map(|r| r.entity_key));
        }

        assert_eq!(seen, ["STU-42", "STU-32", "STU-22", "STU-12", "STU-02"]);
    }

    #[tokio::test]
    async fn replace_pending_is_guarded() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();
        let policy = RetryPolicy::new(TaskType::onboarding(), 3, 1).unwrap();

        let rec = record("STU-2", OutcomeCode::ServerError, now);
        store.insert_if_absent(rec.clone()).await.unwrap();

        let next = rec.evaluated(OutcomeCode::ServerError, &policy, now).unwrap();
        assert!(store.replace_pending(0, next.clone()).await.unwrap());

        // A second writer holding the stale view loses.
        assert!(!store.replace_pending(0, next).await.unwrap());

        let closed = store.get(rec.id).await.unwrap().unwrap();
        let closed = closed.evaluated(OutcomeCode::Success, &policy, now).unwrap();
        assert!(store.replace_pending(1, closed.clone()).await.unwrap());

        // Terminal records are never replaced.
        let mut again = closed.clone();
        again.state = RetryState::Pending;
        assert!(!store.replace_pending(2, again).await.unwrap());
        assert_eq!(store.get(rec.id).await.unwrap().unwrap().state, RetryState::Closed);
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let store = InMemoryRetryRecordStore::new();
        let now = Utc::now();

        for (key, outcome) in [
            ("STU-10", OutcomeCode::Success),
            ("STU-11", OutcomeCode::Conflict),
            ("STU-12", OutcomeCode::ServerError),
        ] {
            store.insert_if_absent(record(key, outcome, now)).await.unwrap();
        }

        assert_eq!(store.list(None, 10).await.unwrap().len(), 3);
        let failed = store.list(Some(RetryState::Failed), 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].entity_key, "STU-11");
    }
}
