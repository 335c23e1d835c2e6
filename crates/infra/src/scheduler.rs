//! Periodic retry scheduler.
//!
//! Each pass pages through every due `PENDING` record, re-evaluates it against
//! the outcome evaluator, applies the transition table and writes the
//! replacement record back. Passes never overlap: a tick that fires while a
//! pass is still running is skipped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use rollcall_core::RetryRecordId;
use rollcall_retry::{RetryRecord, RetryState};

use crate::config::SchedulerConfig;
use crate::error::{ProcessingError, with_deadline};
use crate::external::OutcomeEvaluator;
use crate::policy_store::RetryPolicyStore;
use crate::retry_store::{DueCursor, RetryRecordStore};

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    /// Distinct due records visited by the pass.
    pub eligible: usize,
    pub closed: usize,
    pub failed: usize,
    pub still_pending: usize,
    /// Records left untouched because their task type has no policy.
    pub skipped_no_policy: usize,
    /// Records that changed underneath the pass and were not overwritten.
    pub stale: usize,
    /// Records whose processing hit a transient failure.
    pub errors: usize,
}

enum Step {
    Transitioned(RetryState),
    NoPolicy,
    Stale,
}

/// Time-triggered re-evaluation of pending retry records.
pub struct RetryScheduler {
    records: Arc<dyn RetryRecordStore>,
    policies: Arc<dyn RetryPolicyStore>,
    evaluator: Arc<dyn OutcomeEvaluator>,
    config: SchedulerConfig,
    run_lock: tokio::sync::Mutex<()>,
}

impl RetryScheduler {
    pub fn new(
        records: Arc<dyn RetryRecordStore>,
        policies: Arc<dyn RetryPolicyStore>,
        evaluator: Arc<dyn OutcomeEvaluator>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            records,
            policies,
            evaluator,
            config,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one pass now. `None` when another pass is in progress.
    pub async fn run_once(&self) -> Option<PassReport> {
        self.run_once_at(Utc::now()).await
    }

    /// Run one pass as of `now`. `None` when another pass is in progress.
    #[instrument(skip(self))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Option<PassReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!("previous scheduler pass still running; skipping");
            return None;
        };

        let mut report = PassReport {
            started_at: now,
            ..PassReport::default()
        };

        let page_size = self.config.page_size.max(1);
        let mut after: Option<DueCursor> = None;
        // A record rescheduled to `now` sorts again after the cursor.
        let mut seen: HashSet<RetryRecordId> = HashSet::new();

        loop {
            let page = match with_deadline(
                "records.list_due",
                self.config.call_timeout,
                self.records.list_due(now, after, page_size),
            )
            .await
            {
                Ok(page) => page,
                Err(err) => {
                    warn!(error = %err, "could not load due retry records");
                    report.errors += 1;
                    break;
                }
            };
            let exhausted = page.len() < page_size;
            after = page.last().map(DueCursor::of);

            for record in page {
                if !seen.insert(record.id) {
                    continue;
                }
                report.eligible += 1;
                let record_id = record.id;
                match self.process(record, now).await {
                    Ok(Step::Transitioned(RetryState::Closed)) => report.closed += 1,
                    Ok(Step::Transitioned(RetryState::Failed)) => report.failed += 1,
                    Ok(Step::Transitioned(RetryState::Pending)) => report.still_pending += 1,
                    Ok(Step::NoPolicy) => report.skipped_no_policy += 1,
                    Ok(Step::Stale) => report.stale += 1,
                    Err(err) => {
                        warn!(%record_id, error = %err, "retry record left for next pass");
                        report.errors += 1;
                    }
                }
            }

            if exhausted || after.is_none() {
                break;
            }
        }

        if report.eligible > 0 {
            info!(
                eligible = report.eligible,
                closed = report.closed,
                failed = report.failed,
                still_pending = report.still_pending,
                skipped_no_policy = report.skipped_no_policy,
                stale = report.stale,
                errors = report.errors,
                "scheduler pass finished"
            );
        }
        Some(report)
    }

    async fn process(&self, record: RetryRecord, now: DateTime<Utc>) -> Result<Step, ProcessingError> {
        let timeout = self.config.call_timeout;

        let Some(policy) = with_deadline("policies.get", timeout, self.policies.get(&record.task_type)).await? else {
            warn!(
                record_id = %record.id,
                task_type = %record.task_type,
                "no retry policy for task type; record stays pending"
            );
            return Ok(Step::NoPolicy);
        };

        // The due query only returns pending records, so this holds unless the
        // store hands back something it should not have.
        if record.state.is_terminal() {
            warn!(record_id = %record.id, state = %record.state, "due query returned a terminal record");
            return Ok(Step::Stale);
        }

        let outcome = with_deadline("evaluator.evaluate", timeout, self.evaluator.evaluate(&record.entity_key)).await?;
        let next = record.evaluated(outcome, &policy, now)?;

        let written = with_deadline(
            "records.replace_pending",
            timeout,
            self.records.replace_pending(record.attempt_count, next.clone()),
        )
        .await?;
        if !written {
            debug!(record_id = %record.id, "retry record changed during pass; not overwritten");
            return Ok(Step::Stale);
        }

        match next.state {
            RetryState::Failed if outcome == rollcall_retry::OutcomeCode::ServerError => info!(
                record_id = %next.id,
                attempts = next.attempt_count,
                max_attempts = policy.max_attempts,
                "retry budget exhausted"
            ),
            state => debug!(record_id = %next.id, %outcome, %state, attempts = next.attempt_count, "retry record evaluated"),
        }
        Ok(Step::Transitioned(next.state))
    }

    /// Start the periodic loop on the current runtime.
    ///
    /// The first pass runs immediately; later ones follow the configured
    /// period. Missed ticks are dropped, not queued.
    pub fn spawn(self: Arc<Self>) -> RetrySchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let last_report = Arc::new(Mutex::new(None));

        let join = tokio::spawn(scheduler_loop(self, shutdown.clone(), last_report.clone()));

        RetrySchedulerHandle {
            shutdown,
            join: Some(join),
            last_report,
        }
    }
}

async fn scheduler_loop(
    scheduler: Arc<RetryScheduler>,
    shutdown: Arc<Notify>,
    last_report: Arc<Mutex<Option<PassReport>>>,
) {
    info!(interval = ?scheduler.config.interval, "retry scheduler started");

    let mut ticker = tokio::time::interval(scheduler.config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                if let Some(report) = scheduler.run_once().await {
                    if let Ok(mut slot) = last_report.lock() {
                        *slot = Some(report);
                    }
                }
            }
        }
    }

    info!("retry scheduler stopped");
}

/// Handle to a running scheduler loop.
#[derive(Debug)]
pub struct RetrySchedulerHandle {
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
    last_report: Arc<Mutex<Option<PassReport>>>,
}

impl RetrySchedulerHandle {
    /// Report of the most recent completed periodic pass.
    pub fn last_report(&self) -> Option<PassReport> {
        self.last_report.lock().ok().and_then(|slot| slot.clone())
    }

    /// Stop the loop, letting an in-flight pass finish first.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rollcall_retry::{OutcomeCode, RetryPolicy, TaskType};

    use super::*;
    use crate::external::LastDigitEvaluator;
    use crate::policy_store::InMemoryRetryPolicyStore;
    use crate::retry_store::InMemoryRetryRecordStore;

    fn pending(entity_key: &str, now: DateTime<Utc>) -> RetryRecord {
        RetryRecord::open(
            entity_key,
            TaskType::onboarding(),
            serde_json::json!({ "entityKey": entity_key }),
            OutcomeCode::ServerError,
            now,
            chrono::Duration::zero(),
        )
        .unwrap()
    }

    fn scheduler(records: Arc<InMemoryRetryRecordStore>, max_attempts: u32) -> RetryScheduler {
        paged_scheduler(records, max_attempts, 5, SchedulerConfig::default().page_size)
    }

    fn paged_scheduler(
        records: Arc<InMemoryRetryRecordStore>,
        max_attempts: u32,
        interval_minutes: u32,
        page_size: usize,
    ) -> RetryScheduler {
        let policy = RetryPolicy::new(TaskType::onboarding(), max_attempts, interval_minutes).unwrap();
        RetryScheduler::new(
            records,
            Arc::new(InMemoryRetryPolicyStore::with_policies([policy])),
            Arc::new(LastDigitEvaluator),
            SchedulerConfig {
                page_size,
                ..SchedulerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn empty_store_yields_empty_report() {
        let scheduler = scheduler(InMemoryRetryRecordStore::arc(), 3);
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.eligible, 0);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn not_yet_due_records_are_left_alone() {
        let records = InMemoryRetryRecordStore::arc();
        let now = Utc::now();
        let mut record = pending("STU-2", now);
        record.next_eligible_at = now + chrono::Duration::minutes(10);
        records.upsert(record.clone()).await.unwrap();

        let report = scheduler(records.clone(), 3).run_once_at(now).await.unwrap();
        assert_eq!(report.eligible, 0);
        assert_eq!(records.get(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn pending_record_is_rescheduled() {
        let records = InMemoryRetryRecordStore::arc();
        let now = Utc::now();
        let record = pending("STU-2", now);
        records.upsert(record.clone()).await.unwrap();

        let report = scheduler(records.clone(), 3).run_once_at(now).await.unwrap();
        assert_eq!(report.still_pending, 1);

        let stored = records.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.state, RetryState::Pending);
        assert_eq!(stored.last_attempt_at, now);
        assert_eq!(stored.next_eligible_at, now + chrono::Duration::minutes(5));
        assert_eq!(stored.last_outcome(), Some(OutcomeCode::ServerError));
    }

    #[tokio::test]
    async fn pass_visits_due_records_past_the_first_page() {
        let records = InMemoryRetryRecordStore::arc();
        let now = Utc::now();
        for (key, minutes) in [("STU-8", 30), ("STU-9", 20)] {
            let mut orphan = pending(key, now);
            orphan.task_type = TaskType::new("UNCONFIGURED");
            orphan.next_eligible_at = now - chrono::Duration::minutes(minutes);
            records.upsert(orphan).await.unwrap();
        }
        let configured = pending("STU-2", now - chrono::Duration::minutes(1));
        records.upsert(configured.clone()).await.unwrap();

        let report = paged_scheduler(records.clone(), 3, 5, 2).run_once_at(now).await.unwrap();
        assert_eq!(report.eligible, 3);
        assert_eq!(report.skipped_no_policy, 2);
        assert_eq!(report.still_pending, 1);
        assert_eq!(records.get(configured.id).await.unwrap().unwrap().attempt_count, 1);
    }

    #[tokio::test]
    async fn record_rescheduled_to_now_is_evaluated_once_per_pass() {
        let records = InMemoryRetryRecordStore::arc();
        let now = Utc::now();
        let mut ids = Vec::new();
        for key in ["STU-2", "STU-12", "STU-22"] {
            let record = pending(key, now - chrono::Duration::minutes(1));
            ids.push(record.id);
            records.upsert(record).await.unwrap();
        }

        let report = paged_scheduler(records.clone(), 10, 0, 1).run_once_at(now).await.unwrap();
        assert_eq!(report.eligible, 3);
        assert_eq!(report.still_pending, 3);
        for id in ids {
            let stored = records.get(id).await.unwrap().unwrap();
            assert_eq!(stored.attempt_count, 1);
            assert_eq!(stored.next_eligible_at, now);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_runs_and_stops() {
        let records = InMemoryRetryRecordStore::arc();
        let record = pending("STU-2", Utc::now() - chrono::Duration::minutes(1));
        records.upsert(record.clone()).await.unwrap();

        let handle = Arc::new(scheduler(records.clone(), 3)).spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = handle.last_report().expect("first pass runs immediately");
        assert_eq!(report.eligible, 1);
        handle.shutdown().await;

        let stored = records.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
    }
}
