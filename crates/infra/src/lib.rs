//! Infrastructure layer: stores, external collaborators, intake, scheduler, workers.

pub mod config;
pub mod error;
pub mod external;
pub mod intake;
pub mod policy_store;
pub mod retry_store;
pub mod scheduler;
pub mod workers;


pub use config::{AppConfig, ConfigError, EvaluatorConfig, IntakeConfig, SchedulerConfig, StoreConfig};
pub use error::ProcessingError;
pub use intake::{IntakeHandler, IntakeOutcome};
pub use scheduler::{PassReport, RetryScheduler, RetrySchedulerHandle};

/// Schema for the Postgres stores (idempotent).
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_retry_records.sql");

/// Apply [`SCHEMA_SQL`] to a pool.
pub async fn ensure_schema(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}
