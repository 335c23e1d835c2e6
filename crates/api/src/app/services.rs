//! Infrastructure wiring: stores, evaluator, intake, scheduler, bus.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use rollcall_events::{EventEnvelope, InMemoryEventBus, OnboardingEvent};
use rollcall_infra::external::{HttpOutcomeEvaluator, LastDigitEvaluator, OutcomeEvaluator};
use rollcall_infra::policy_store::{InMemoryRetryPolicyStore, PostgresRetryPolicyStore, RetryPolicyStore};
use rollcall_infra::retry_store::{InMemoryRetryRecordStore, PostgresRetryRecordStore, RetryRecordStore};
use rollcall_infra::workers::{OnboardingWorker, WorkerHandle};
use rollcall_infra::{
    AppConfig, EvaluatorConfig, IntakeHandler, RetryScheduler, RetrySchedulerHandle, StoreConfig,
};

pub type OnboardingBus = InMemoryEventBus<EventEnvelope<OnboardingEvent>>;

/// Everything the HTTP handlers and background tasks share.
#[derive(Clone)]
pub struct AppServices {
    pub records: Arc<dyn RetryRecordStore>,
    pub policies: Arc<dyn RetryPolicyStore>,
    pub intake: IntakeHandler,
    pub scheduler: Arc<RetryScheduler>,
    pub bus: Arc<OnboardingBus>,
    /// `"in_memory"` or `"postgres"`.
    pub backend: &'static str,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let (records, policies, backend): (Arc<dyn RetryRecordStore>, Arc<dyn RetryPolicyStore>, _) =
        match &config.stores {
            StoreConfig::InMemory => (
                InMemoryRetryRecordStore::arc(),
                Arc::new(InMemoryRetryPolicyStore::new()),
                "in_memory",
            ),
            StoreConfig::Postgres { database_url } => {
                let pool = PgPool::connect(database_url)
                    .await
                    .context("failed to connect to Postgres")?;
                rollcall_infra::ensure_schema(&pool)
                    .await
                    .context("failed to apply retry schema")?;
                (
                    Arc::new(PostgresRetryRecordStore::new(pool.clone())),
                    Arc::new(PostgresRetryPolicyStore::new(pool)),
                    "postgres",
                )
            }
        };

    // Operator edits to an existing policy survive restarts.
    let seed = &config.seed_policy;
    if policies.get(&seed.task_type).await?.is_none() {
        policies.upsert(seed.clone()).await?;
        tracing::info!(
            task_type = %seed.task_type,
            max_attempts = seed.max_attempts,
            retry_interval_minutes = seed.retry_interval_minutes,
            "seeded default retry policy"
        );
    }

    let evaluator: Arc<dyn OutcomeEvaluator> = match &config.evaluator {
        EvaluatorConfig::LastDigit => Arc::new(LastDigitEvaluator),
        EvaluatorConfig::Http { url, timeout } => Arc::new(HttpOutcomeEvaluator::new(url.clone(), *timeout)?),
    };

    let intake = IntakeHandler::new(records.clone(), evaluator.clone(), config.intake.clone());
    let scheduler = Arc::new(RetryScheduler::new(
        records.clone(),
        policies.clone(),
        evaluator,
        config.scheduler.clone(),
    ));

    tracing::info!(backend, evaluator = ?config.evaluator, "services ready");

    Ok(Arc::new(AppServices {
        records,
        policies,
        intake,
        scheduler,
        bus: Arc::new(OnboardingBus::new()),
        backend,
    }))
}

/// Background tasks tied to the process lifetime.
#[derive(Debug)]
pub struct Background {
    scheduler: Option<RetrySchedulerHandle>,
    worker: WorkerHandle,
}

impl Background {
    /// Start the onboarding consumer and the periodic scheduler.
    pub fn start(services: &AppServices) -> Self {
        let mut background = Self::consumer_only(services);
        background.scheduler = Some(services.scheduler.clone().spawn());
        background
    }

    /// Start only the onboarding consumer; passes run on demand.
    pub fn consumer_only(services: &AppServices) -> Self {
        Self {
            scheduler: None,
            worker: OnboardingWorker::spawn(&services.bus, services.intake.clone()),
        }
    }

    pub async fn shutdown(self) {
        self.worker.shutdown().await;
        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown().await;
        }
        tracing::info!("background tasks stopped");
    }
}
