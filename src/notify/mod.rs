//! Tokio broadcast notifier for graph change events.
//!
//! Delivery is best effort: publishing never blocks a mutation, and a
//! subscriber that falls behind the channel capacity observes a lag
//! marker rather than stalling the publisher.

use crate::models::GraphEvent;
use tokio::sync::broadcast;

const DEFAULT_NOTIFIER_CAPACITY: usize = 1024;

/// Central bus for broadcasting graph change events.
#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<GraphEvent>,
}

/// Filtered receiver that yields events matching a predicate.
pub struct FilteredReceiver<F> {
    receiver: broadcast::Receiver<GraphEvent>,
    predicate: F,
}

impl ChangeNotifier {
    /// Creates a notifier with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    ///
    /// A send error only means no subscriber is currently attached;
    /// the mutation that produced the event already succeeded.
    pub fn publish(&self, event: GraphEvent) {
        metrics::counter!("notifier_publish_total").increment(1);
        let receivers = self.sender.receiver_count();
        metrics::gauge!("notifier_receivers").set(receivers as f64);
        match self.sender.send(event) {
            Ok(_) => {
                metrics::gauge!("notifier_queue_depth").set(self.sender.len() as f64);
            },
            Err(_) => {
                metrics::counter!("notifier_publish_dropped_total").increment(1);
            },
        }
    }

    /// Subscribes to every event on the bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        metrics::counter!("notifier_subscriptions_total").increment(1);
        metrics::gauge!("notifier_receivers").set(self.sender.receiver_count() as f64);
        self.sender.subscribe()
    }

    /// Subscribes with a predicate to filter events.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> FilteredReceiver<F>
    where
        F: Fn(&GraphEvent) -> bool,
    {
        metrics::counter!("notifier_subscriptions_total").increment(1);
        metrics::gauge!("notifier_receivers").set(self.sender.receiver_count() as f64);
        FilteredReceiver {
            receiver: self.sender.subscribe(),
            predicate,
        }
    }

    /// Subscribes to events for a single project.
    #[must_use]
    pub fn subscribe_project(
        &self,
        project_id: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&GraphEvent) -> bool> {
        let project_id = project_id.into();
        self.subscribe_filtered(move |event| event.project_id() == project_id)
    }

    /// Subscribes to events of one type (dotted name, e.g. `entity.added`).
    #[must_use]
    pub fn subscribe_event_type(
        &self,
        event_type: &'static str,
    ) -> FilteredReceiver<impl Fn(&GraphEvent) -> bool> {
        self.subscribe_filtered(move |event| event.event_type() == event_type)
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFIER_CAPACITY)
    }
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&GraphEvent) -> bool,
{
    /// Receives the next event that matches the predicate.
    ///
    /// Lagged markers are counted and skipped so a slow subscriber keeps
    /// receiving current events after falling behind.
    pub async fn recv(&mut self) -> Result<GraphEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if (self.predicate)(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("notifier_lagged_total").increment(skipped);
                },
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityType, EventMeta};

    fn entity_added(project: &str, name: &str) -> GraphEvent {
        GraphEvent::EntityAdded {
            meta: EventMeta::new(project),
            entity_id: EntityId::from_name(name),
            entity_type: EntityType::Character,
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_published_event() {
        let notifier = ChangeNotifier::new(16);
        let mut receiver = notifier.subscribe();

        notifier.publish(entity_added("p1", "Mickey"));

        let event = receiver.recv().await.expect("receive event");
        assert_eq!(event.event_type(), "entity.added");
        assert_eq!(event.project_id(), "p1");
    }

    #[tokio::test]
    async fn test_subscribe_project_skips_other_projects() {
        let notifier = ChangeNotifier::new(16);
        let mut filtered = notifier.subscribe_project("wanted");

        notifier.publish(entity_added("other", "Sarah"));
        notifier.publish(entity_added("wanted", "Mickey"));

        let event = filtered.recv().await.expect("receive event");
        assert_eq!(event.project_id(), "wanted");
    }

    #[tokio::test]
    async fn test_subscribe_event_type() {
        let notifier = ChangeNotifier::new(16);
        let mut filtered = notifier.subscribe_event_type("entity.deleted");

        notifier.publish(entity_added("p1", "Mickey"));
        notifier.publish(GraphEvent::EntityDeleted {
            meta: EventMeta::new("p1"),
            entity_id: EntityId::from_name("Mickey"),
            cascaded_relationships: 2,
        });

        let event = filtered.recv().await.expect("receive event");
        assert_eq!(event.event_type(), "entity.deleted");
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let notifier = ChangeNotifier::new(4);
        notifier.publish(entity_added("p1", "Mickey"));
    }
}
