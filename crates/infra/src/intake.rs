//! Intake path: turns onboarding events into retry records.
//!
//! Delivery is at-least-once, so the handler is an idempotency gate first:
//! an event whose (entity key, task type) already has a record is dropped
//! without calling the evaluator. Failures are logged and absorbed; a
//! redelivery of the same event is the retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use rollcall_core::RetryRecordId;
use rollcall_events::OnboardingEvent;
use rollcall_retry::RetryRecord;

use crate::config::IntakeConfig;
use crate::error::{ProcessingError, with_deadline};
use crate::external::OutcomeEvaluator;
use crate::retry_store::{InsertOutcome, RetryRecordStore};

/// What happened to one delivered event.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// First sighting; the initial record was stored.
    Created(RetryRecord),
    /// A record for this entity and task type already existed.
    Duplicate(RetryRecordId),
    /// A transient failure; nothing was written.
    Aborted,
}

/// Consumer of onboarding events.
#[derive(Clone)]
pub struct IntakeHandler {
    records: Arc<dyn RetryRecordStore>,
    evaluator: Arc<dyn OutcomeEvaluator>,
    config: IntakeConfig,
}

impl IntakeHandler {
    pub fn new(
        records: Arc<dyn RetryRecordStore>,
        evaluator: Arc<dyn OutcomeEvaluator>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            records,
            evaluator,
            config,
        }
    }

    /// Handle one delivery at the current time.
    pub async fn handle(&self, event: &OnboardingEvent) -> IntakeOutcome {
        self.handle_at(event, Utc::now()).await
    }

    /// Handle one delivery as of `now`. Never fails: errors are logged and
    /// reported as [`IntakeOutcome::Aborted`].
    #[instrument(skip(self, event), fields(entity_key = %event.entity_key))]
    pub async fn handle_at(&self, event: &OnboardingEvent, now: DateTime<Utc>) -> IntakeOutcome {
        match self.try_handle(event, now).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "onboarding intake aborted; awaiting redelivery");
                IntakeOutcome::Aborted
            }
        }
    }

    async fn try_handle(&self, event: &OnboardingEvent, now: DateTime<Utc>) -> Result<IntakeOutcome, ProcessingError> {
        let timeout = self.config.call_timeout;
        let task_type = &self.config.task_type;

        let existing = with_deadline(
            "records.find_by_entity",
            timeout,
            self.records.find_by_entity(&event.entity_key, task_type),
        )
        .await?;
        if let Some(existing) = existing {
            debug!(record_id = %existing.id, "duplicate onboarding delivery ignored");
            return Ok(IntakeOutcome::Duplicate(existing.id));
        }

        let outcome = with_deadline("evaluator.evaluate", timeout, self.evaluator.evaluate(&event.entity_key)).await?;

        let record = RetryRecord::open(
            event.entity_key.clone(),
            task_type.clone(),
            event.to_payload(),
            outcome,
            now,
            self.config.initial_delay,
        )?;

        match with_deadline("records.insert_if_absent", timeout, self.records.insert_if_absent(record.clone())).await? {
            InsertOutcome::Inserted => {
                info!(
                    record_id = %record.id,
                    outcome = %outcome,
                    state = %record.state,
                    "retry record created"
                );
                Ok(IntakeOutcome::Created(record))
            }
            InsertOutcome::Existing(existing) => {
                debug!(record_id = %existing.id, "lost intake race; existing record kept");
                Ok(IntakeOutcome::Duplicate(existing.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rollcall_retry::{RetryState, TaskType};

    use super::*;
    use crate::external::LastDigitEvaluator;
    use crate::retry_store::InMemoryRetryRecordStore;

    fn event(entity_key: &str) -> OnboardingEvent {
        OnboardingEvent {
            entity_key: entity_key.to_string(),
            roll_no: "17".into(),
            name: "Ravi".into(),
            student_class: "5A".into(),
            school: "Lakeview".into(),
            dob: NaiveDate::from_ymd_opt(2015, 2, 1).unwrap(),
        }
    }

    fn handler(records: Arc<InMemoryRetryRecordStore>) -> IntakeHandler {
        IntakeHandler::new(records, Arc::new(LastDigitEvaluator), IntakeConfig::default())
    }

    #[tokio::test]
    async fn creates_record_with_captured_payload() {
        let records = InMemoryRetryRecordStore::arc();
        let intake = handler(records.clone());
        let now = Utc::now();

        let IntakeOutcome::Created(record) = intake.handle_at(&event("STU-12"), now).await else {
            panic!("expected a new record");
        };

        assert_eq!(record.state, RetryState::Pending);
        assert_eq!(record.attempt_count, 0);
        assert_eq!(record.task_type, TaskType::onboarding());
        assert_eq!(record.request_payload["rollNo"], "17");
        assert_eq!(record.next_eligible_at, now + chrono::Duration::minutes(5));
        assert_eq!(records.get(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn second_delivery_is_absorbed() {
        let records = InMemoryRetryRecordStore::arc();
        let intake = handler(records.clone());

        let IntakeOutcome::Created(first) = intake.handle(&event("STU-30")).await else {
            panic!("expected a new record");
        };
        assert_eq!(intake.handle(&event("STU-30")).await, IntakeOutcome::Duplicate(first.id));
        assert_eq!(records.stats().await.unwrap().total(), 1);
    }
}
