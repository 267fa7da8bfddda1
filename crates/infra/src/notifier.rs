//! Post-commit lifecycle notifications.
//!
//! Services hand a [`QuoteLifecycleEvent`] to a [`Notifier`] only after the
//! unit of work that produced it has committed. Delivery is best effort: a
//! failing sink is logged and never reaches the caller.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use quoteforge_events::{Event, EventBus, EventEnvelope};
use quoteforge_quoting::QuoteLifecycleEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget sink for committed lifecycle events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: QuoteLifecycleEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: QuoteLifecycleEvent) {}
}

/// Final destination of wrapped notifications (webhook relay, bus, ...).
#[async_trait::async_trait]
pub trait WebhookSink: Send + Sync + 'static {
    async fn deliver(&self, envelope: &EventEnvelope<Value>) -> Result<(), NotifyError>;
}

/// Publishes wrapped notifications on an [`EventBus`].
#[derive(Debug, Clone)]
pub struct BusWebhookSink<B> {
    bus: B,
}

impl<B> BusWebhookSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl<B> WebhookSink for BusWebhookSink<B>
where
    B: EventBus<EventEnvelope<Value>> + 'static,
{
    async fn deliver(&self, envelope: &EventEnvelope<Value>) -> Result<(), NotifyError> {
        self.bus
            .publish(envelope.clone())
            .map_err(|e| NotifyError::Delivery(format!("{e:?}")))
    }
}

/// Queues events to a background task that wraps and delivers them.
///
/// `notify` never blocks. The task ends once every clone of the notifier has
/// been dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<QuoteLifecycleEvent>,
}

impl ChannelNotifier {
    /// Spawn the delivery task on the current tokio runtime.
    pub fn spawn<S: WebhookSink>(sink: S) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<QuoteLifecycleEvent>();

        let join = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event_type = event.event_type();
                let result = EventEnvelope::wrap(
                    *event.quote_id().as_uuid(),
                    QuoteLifecycleEvent::AGGREGATE_TYPE,
                    event,
                )
                .to_json()
                .map_err(NotifyError::from);

                let delivered = match result {
                    Ok(envelope) => sink.deliver(&envelope).await,
                    Err(e) => Err(e),
                };
                match delivered {
                    Ok(()) => debug!(event_type, "notification delivered"),
                    Err(err) => warn!(event_type, error = %err, "notification delivery failed"),
                }
            }
        });

        (Self { tx }, join)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: QuoteLifecycleEvent) {
        if self.tx.send(event).is_err() {
            warn!("notification worker stopped; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quoteforge_core::{QuoteId, UserId};
    use quoteforge_events::InMemoryEventBus;
    use std::sync::Arc;

    fn sent(quote_id: QuoteId) -> QuoteLifecycleEvent {
        QuoteLifecycleEvent::Sent {
            quote_id,
            quote_number: "Q-20260101-0001".to_string(),
            recipient: "buyer@example.com".to_string(),
            actor: UserId::new(),
            at: Utc::now(),
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl WebhookSink for FailingSink {
        async fn deliver(&self, _envelope: &EventEnvelope<Value>) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("endpoint down".to_string()))
        }
    }

    #[tokio::test]
    async fn events_reach_the_bus_wrapped_in_envelopes() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<Value>>> = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let (notifier, join) = ChannelNotifier::spawn(BusWebhookSink::new(bus.clone()));

        let quote_id = QuoteId::new();
        notifier.notify(sent(quote_id));
        drop(notifier);
        join.await.unwrap();

        let envelope = subscription.try_recv().unwrap();
        assert_eq!(envelope.event_type(), "quote.sent");
        assert_eq!(envelope.aggregate_type(), "quote");
        assert_eq!(envelope.aggregate_id(), *quote_id.as_uuid());
        assert_eq!(envelope.payload()["type"], "sent");
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let (notifier, join) = ChannelNotifier::spawn(FailingSink);
        notifier.notify(sent(QuoteId::new()));
        notifier.notify(sent(QuoteId::new()));
        drop(notifier);
        join.await.unwrap();
    }
}
