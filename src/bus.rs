//! Fan-out of control messages to subscribed handlers.
//!
//! Dispatch is synchronous on the publishing thread, in subscription order.
//! The registry is carried by the engine context (cloning an [`EventBus`]
//! shares it) rather than living in a global.

use crate::control::ControlMessage;
use crate::lock::{read_or_recover, write_or_recover};
use std::sync::{Arc, RwLock};

pub trait Subscriber: Send + Sync {
    fn receive(&self, message: &ControlMessage);
}

impl<F> Subscriber for F
where
    F: Fn(&ControlMessage) + Send + Sync,
{
    fn receive(&self, message: &ControlMessage) {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Arc<dyn Subscriber>)>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let mut registry = write_or_recover(&self.registry, "EventBus::subscribe");
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.push((id, subscriber));
        id
    }

    /// Returns `true` when `id` was still subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = write_or_recover(&self.registry, "EventBus::unsubscribe");
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(existing, _)| *existing != id);
        registry.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        read_or_recover(&self.registry, "EventBus::subscriber_count")
            .subscribers
            .len()
    }

    pub fn publish(&self, message: &ControlMessage) {
        // Snapshot first so a handler may subscribe or unsubscribe without deadlocking.
        let subscribers: Vec<Arc<dyn Subscriber>> =
            read_or_recover(&self.registry, "EventBus::publish")
                .subscribers
                .iter()
                .map(|(_, subscriber)| Arc::clone(subscriber))
                .collect();
        tracing::trace!(?message, subscribers = subscribers.len(), "control message");
        for subscriber in subscribers {
            subscriber.receive(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<dyn Subscriber>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |message: &ControlMessage| {
            sink.lock().expect("lock").push(format!("{message:?}"));
        });
        (seen, subscriber)
    }

    #[test]
    fn publish_reaches_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            bus.subscribe(Arc::new(move |_: &ControlMessage| {
                order.lock().expect("lock").push(tag);
            }));
        }
        bus.publish(&ControlMessage::StartSpinner);
        assert_eq!(*order.lock().expect("lock"), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (seen, subscriber) = recorder();
        let id = bus.subscribe(subscriber);
        bus.publish(&ControlMessage::StopSpinner);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&ControlMessage::StopSpinner);
        assert_eq!(seen.lock().expect("lock").len(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_the_registry() {
        let bus = EventBus::new();
        let (seen, subscriber) = recorder();
        bus.subscribe(subscriber);
        let clone = bus.clone();
        clone.publish(&ControlMessage::EnvDump);
        assert_eq!(seen.lock().expect("lock").as_slice(), ["EnvDump"]);
    }
}
