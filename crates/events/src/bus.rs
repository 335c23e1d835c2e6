//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the transport between whatever produces onboarding events and the
//! intake consumer. It makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory channels today, a broker tomorrow
//! - **At-least-once delivery**: a message may arrive more than once; consumers must be idempotent
//! - **No ordering guarantees** across publishers
//! - **No persistence**: the bus distributes, the record store is the source of truth
//!
//! The intake path absorbs duplicates through its (entity key, task type) lookup,
//! so redelivery never creates a second retry record.

use std::sync::Arc;

use tokio::sync::mpsc;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was created
/// (broadcast semantics).
///
/// ```ignore
/// let mut subscription = bus.subscribe();
/// while let Some(message) = subscription.recv().await {
///     handle(message).await;
/// }
/// // `None`: the bus was dropped.
/// ```
///
/// A subscription is meant for a single consumer task.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// POST /onboarding ──publish──▶ EventBus ──subscribe──▶ onboarding worker ──▶ IntakeHandler
/// ```
///
/// `publish()` may fail (closed transport, poisoned state). Failures surface to the
/// producer; consumers never see partial messages.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
