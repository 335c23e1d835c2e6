//! Event transport abstractions and the inbound onboarding message.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;
pub mod onboarding;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use onboarding::{ONBOARDING_TOPIC, OnboardingEvent};
