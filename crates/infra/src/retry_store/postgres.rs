//! Postgres-backed retry record store.
//!
//! Uniqueness of (entity_key, task_type) is enforced by the
//! `retry_records_entity_task_uq` index, so concurrent intake for the same
//! entity cannot create two rows.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RetryStoreError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | any | `Storage` |
//! | Row decode failure | N/A | `Corrupt` |
//! | PoolClosed / IO / other | N/A | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use rollcall_core::RetryRecordId;
use rollcall_retry::{RetryRecord, RetryState, TaskType};

use super::{DueCursor, InsertOutcome, RetryRecordStore, RetryStats, RetryStoreError};

const COLUMNS: &str = "id, entity_key, task_type, request_payload, response_payload, \
     created_at, last_attempt_at, next_eligible_at, attempt_count, state";

/// Postgres-backed retry record store.
#[derive(Debug, Clone)]
pub struct PostgresRetryRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRetryRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn fetch_optional(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<RetryRecord>, RetryStoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn fetch_all(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<RetryRecord>, RetryStoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl RetryRecordStore for PostgresRetryRecordStore {
    #[instrument(skip(self), err)]
    async fn get(&self, id: RetryRecordId) -> Result<Option<RetryRecord>, RetryStoreError> {
        let sql = format!("SELECT {COLUMNS} FROM retry_records WHERE id = $1");
        self.fetch_optional("get", sqlx::query(&sql).bind(*id.as_uuid()))
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_entity(
        &self,
        entity_key: &str,
        task_type: &TaskType,
    ) -> Result<Option<RetryRecord>, RetryStoreError> {
        let sql = format!("SELECT {COLUMNS} FROM retry_records WHERE entity_key = $1 AND task_type = $2");
        self.fetch_optional(
            "find_by_entity",
            sqlx::query(&sql).bind(entity_key).bind(task_type.as_str()),
        )
        .await
    }

    #[instrument(skip(self, record), fields(record_id = %record.id, entity_key = %record.entity_key), err)]
    async fn insert_if_absent(&self, record: RetryRecord) -> Result<InsertOutcome, RetryStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO retry_records (
                id, entity_key, task_type, request_payload, response_payload,
                created_at, last_attempt_at, next_eligible_at, attempt_count, state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (entity_key, task_type) DO NOTHING
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(&record.entity_key)
        .bind(record.task_type.as_str())
        .bind(&record.request_payload)
        .bind(&record.response_payload)
        .bind(record.created_at)
        .bind(record.last_attempt_at)
        .bind(record.next_eligible_at)
        .bind(attempts_to_sql(record.attempt_count)?)
        .bind(record.state.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_if_absent", e))?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        match self.find_by_entity(&record.entity_key, &record.task_type).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(RetryStoreError::Storage(format!(
                "insert for entity {} skipped but no conflicting row found",
                record.entity_key
            ))),
        }
    }

    #[instrument(skip(self, record), fields(record_id = %record.id, state = %record.state), err)]
    async fn upsert(&self, record: RetryRecord) -> Result<(), RetryStoreError> {
        sqlx::query(
            r#"
            INSERT INTO retry_records (
                id, entity_key, task_type, request_payload, response_payload,
                created_at, last_attempt_at, next_eligible_at, attempt_count, state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                entity_key = EXCLUDED.entity_key,
                task_type = EXCLUDED.task_type,
                request_payload = EXCLUDED.request_payload,
                response_payload = EXCLUDED.response_payload,
                created_at = EXCLUDED.created_at,
                last_attempt_at = EXCLUDED.last_attempt_at,
                next_eligible_at = EXCLUDED.next_eligible_at,
                attempt_count = EXCLUDED.attempt_count,
                state = EXCLUDED.state
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(&record.entity_key)
        .bind(record.task_type.as_str())
        .bind(&record.request_payload)
        .bind(&record.response_payload)
        .bind(record.created_at)
        .bind(record.last_attempt_at)
        .bind(record.next_eligible_at)
        .bind(attempts_to_sql(record.attempt_count)?)
        .bind(record.state.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| match map_sqlx_error("upsert", e) {
            RetryStoreError::Duplicate { .. } => RetryStoreError::Duplicate {
                entity_key: record.entity_key.clone(),
                task_type: record.task_type.to_string(),
            },
            other => other,
        })?;

        Ok(())
    }

    #[instrument(skip(self, record), fields(record_id = %record.id), err)]
    async fn replace_pending(
        &self,
        expected_attempt_count: u32,
        record: RetryRecord,
    ) -> Result<bool, RetryStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE retry_records SET
                response_payload = $2,
                last_attempt_at = $3,
                next_eligible_at = $4,
                attempt_count = $5,
                state = $6
            WHERE id = $1
                AND state = 'PENDING'
                AND attempt_count = $7
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(&record.response_payload)
        .bind(record.last_attempt_at)
        .bind(record.next_eligible_at)
        .bind(attempts_to_sql(record.attempt_count)?)
        .bind(record.state.as_str())
        .bind(attempts_to_sql(expected_attempt_count)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("replace_pending", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> Result<Vec<RetryRecord>, RetryStoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM retry_records \
             WHERE state = 'PENDING' AND next_eligible_at <= $1 \
               AND ($2::timestamptz IS NULL OR (next_eligible_at, id) > ($2, $3::uuid)) \
             ORDER BY next_eligible_at, id LIMIT $4"
        );
        self.fetch_all(
            "list_due",
            sqlx::query(&sql)
                .bind(now)
                .bind(after.map(|c| c.next_eligible_at))
                .bind(after.map(|c| *c.id.as_uuid()))
                .bind(limit_to_sql(limit)),
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn list(&self, state: Option<RetryState>, limit: usize) -> Result<Vec<RetryRecord>, RetryStoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM retry_records \
             WHERE ($1::text IS NULL OR state = $1) \
             ORDER BY created_at, id LIMIT $2"
        );
        self.fetch_all(
            "list",
            sqlx::query(&sql)
                .bind(state.map(RetryState::as_str))
                .bind(limit_to_sql(limit)),
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn stats(&self) -> Result<RetryStats, RetryStoreError> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM retry_records GROUP BY state")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stats", e))?;

        let mut stats = RetryStats::default();
        for row in rows {
            let state: String = row.try_get("state").map_err(corrupt)?;
            let n: i64 = row.try_get("n").map_err(corrupt)?;
            let n = usize::try_from(n).unwrap_or(0);
            match RetryState::parse(&state) {
                Some(RetryState::Pending) => stats.pending += n,
                Some(RetryState::Closed) => stats.closed += n,
                Some(RetryState::Failed) => stats.failed += n,
                None => return Err(RetryStoreError::Corrupt(format!("unknown state {state}"))),
            }
        }
        Ok(stats)
    }
}

fn record_from_row(row: &PgRow) -> Result<RetryRecord, RetryStoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let task_type: String = row.try_get("task_type").map_err(corrupt)?;
    let attempt_count: i32 = row.try_get("attempt_count").map_err(corrupt)?;
    let state: String = row.try_get("state").map_err(corrupt)?;

    Ok(RetryRecord {
        id: RetryRecordId::from_uuid(id),
        entity_key: row.try_get("entity_key").map_err(corrupt)?,
        task_type: TaskType::new(task_type),
        request_payload: row.try_get("request_payload").map_err(corrupt)?,
        response_payload: row.try_get("response_payload").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        last_attempt_at: row.try_get("last_attempt_at").map_err(corrupt)?,
        next_eligible_at: row.try_get("next_eligible_at").map_err(corrupt)?,
        attempt_count: u32::try_from(attempt_count)
            .map_err(|_| RetryStoreError::Corrupt(format!("negative attempt_count {attempt_count}")))?,
        state: RetryState::parse(&state)
            .ok_or_else(|| RetryStoreError::Corrupt(format!("unknown state {state}")))?,
    })
}

fn attempts_to_sql(attempts: u32) -> Result<i32, RetryStoreError> {
    i32::try_from(attempts).map_err(|_| RetryStoreError::Corrupt(format!("attempt_count {attempts} out of range")))
}

fn limit_to_sql(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn corrupt(err: sqlx::Error) -> RetryStoreError {
    RetryStoreError::Corrupt(err.to_string())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RetryStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation on (entity_key, task_type).
                Some("23505") => RetryStoreError::Duplicate {
                    entity_key: String::new(),
                    task_type: String::new(),
                },
                _ => RetryStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => RetryStoreError::Storage(format!("connection pool closed in {}", operation)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => corrupt(err),
        _ => RetryStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
