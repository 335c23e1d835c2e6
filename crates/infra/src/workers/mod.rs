//! Background consumers driven by the event bus.

pub mod onboarding_worker;

pub use onboarding_worker::{OnboardingWorker, WorkerHandle, WorkerStats};
