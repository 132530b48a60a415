use crate::registry::types::RegistryEvent;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Token returned by `subscribe`, used to cancel the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// One live subscription: the token plus the receiving end of the event
/// channel. Dropping the receiver is equivalent to unsubscribing; the dead
/// sender is pruned on the next publish.
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<RegistryEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RegistryEvent> {
        self.receiver.recv().await
    }
}

/// In-process fan-out of registry events.
///
/// Delivery is at-most-once per publish and best-effort: each subscriber has
/// its own unbounded channel, so a slow or abandoned subscriber never blocks
/// the publisher or the other subscribers. Events for the same node id arrive
/// in the order the registry generated them, because the single writer
/// publishes synchronously; no ordering holds across different ids once
/// consumers process at their own pace. No durability, no replay.
pub struct EventBus {
    subscribers: DashMap<SubscriptionId, mpsc::UnboundedSender<RegistryEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId::new();
        let (tx, receiver) = mpsc::unbounded_channel();

        self.subscribers.insert(id.clone(), tx);

        tracing::debug!("Subscriber {} attached", id.0);

        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) {
        if self.subscribers.remove(id).is_some() {
            tracing::debug!("Subscriber {} detached", id.0);
        }
    }

    /// Delivers the event to every current subscriber. Never blocks; channels
    /// whose receiver is gone are dropped from the table.
    pub fn publish(&self, event: &RegistryEvent) {
        let mut dead: Vec<SubscriptionId> = Vec::new();

        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_err() {
                dead.push(entry.key().clone());
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
            tracing::debug!("Pruned closed subscriber {}", id.0);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
