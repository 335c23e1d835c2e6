use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use rollcall_events::{EventBus, EventEnvelope, ONBOARDING_TOPIC, OnboardingEvent, Subscription};

use crate::intake::{IntakeHandler, IntakeOutcome};

/// Counters for a running consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub received: u64,
    pub created: u64,
    pub duplicates: u64,
    pub aborted: u64,
    /// Messages on other topics.
    pub ignored: u64,
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A message already being handled is finished first.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Consumer that feeds onboarding events into the intake path.
///
/// Delivery is at-least-once; the intake handler absorbs duplicates, so the
/// worker needs no deduplication of its own.
#[derive(Debug)]
pub struct OnboardingWorker;

impl OnboardingWorker {
    /// Subscribe to `bus` and spawn the consumer task.
    pub fn spawn<B>(bus: &B, intake: IntakeHandler) -> WorkerHandle
    where
        B: EventBus<EventEnvelope<OnboardingEvent>>,
    {
        let shutdown = Arc::new(Notify::new());
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let subscription = bus.subscribe();

        let join = tokio::spawn(worker_loop(subscription, intake, shutdown.clone(), stats.clone()));

        WorkerHandle {
            shutdown,
            join: Some(join),
            stats,
        }
    }
}

async fn worker_loop(
    mut subscription: Subscription<EventEnvelope<OnboardingEvent>>,
    intake: IntakeHandler,
    shutdown: Arc<Notify>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(topic = ONBOARDING_TOPIC, "onboarding worker started");

    loop {
        let envelope = tokio::select! {
            _ = shutdown.notified() => break,
            message = subscription.recv() => match message {
                Some(envelope) => envelope,
                None => break,
            },
        };

        if envelope.topic() != ONBOARDING_TOPIC {
            debug!(topic = envelope.topic(), "ignoring message on foreign topic");
            bump(&stats, |s| s.ignored += 1);
            continue;
        }

        debug!(
            event_id = %envelope.event_id(),
            published_at = %envelope.published_at(),
            "onboarding event received"
        );
        let outcome = intake.handle(envelope.payload()).await;
        bump(&stats, |s| {
            s.received += 1;
            match outcome {
                IntakeOutcome::Created(_) => s.created += 1,
                IntakeOutcome::Duplicate(_) => s.duplicates += 1,
                IntakeOutcome::Aborted => s.aborted += 1,
            }
        });
    }

    info!("onboarding worker stopped");
}

fn bump(stats: &Mutex<WorkerStats>, update: impl FnOnce(&mut WorkerStats)) {
    if let Ok(mut s) = stats.lock() {
        update(&mut s);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use rollcall_events::InMemoryEventBus;

    use super::*;
    use crate::config::IntakeConfig;
    use crate::external::LastDigitEvaluator;
    use crate::retry_store::{InMemoryRetryRecordStore, RetryRecordStore};

    fn envelope(topic: &str, entity_key: &str) -> EventEnvelope<OnboardingEvent> {
        EventEnvelope::new(
            topic,
            OnboardingEvent {
                entity_key: entity_key.into(),
                roll_no: "3".into(),
                name: "Mira".into(),
                student_class: "9C".into(),
                school: "Northfield".into(),
                dob: NaiveDate::from_ymd_opt(2010, 11, 20).unwrap(),
            },
        )
    }

    async fn wait_for(handle: &WorkerHandle, received: u64) {
        for _ in 0..100 {
            if handle.stats().received + handle.stats().ignored >= received {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker did not catch up: {:?}", handle.stats());
    }

    #[tokio::test]
    async fn redelivery_creates_one_record() {
        let bus = InMemoryEventBus::<EventEnvelope<OnboardingEvent>>::new();
        let records = InMemoryRetryRecordStore::arc();
        let intake = IntakeHandler::new(records.clone(), Arc::new(LastDigitEvaluator), IntakeConfig::default());
        let handle = OnboardingWorker::spawn(&bus, intake);

        bus.publish(envelope(ONBOARDING_TOPIC, "STU-40")).unwrap();
        bus.publish(envelope(ONBOARDING_TOPIC, "STU-40")).unwrap();
        bus.publish(envelope("other.topic", "STU-41")).unwrap();
        wait_for(&handle, 3).await;

        let stats = handle.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(records.stats().await.unwrap().total(), 1);

        handle.shutdown().await;
    }
}
