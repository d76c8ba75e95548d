//! In-process event bus with per-producer topics.
//!
//! Delivery is unbounded; a subscription ends when it is cancelled or the
//! bus is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::producer::ProducerEvent;

type Topics = HashMap<String, Vec<(u64, UnboundedSender<ProducerEvent>)>>;

#[derive(Default)]
struct BusInner {
    topics: Mutex<Topics>,
    next_id: AtomicU64,
}

/// Routes producer events to subscribers by producer unique id.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Cancels one subscription. Dropping the handle does not cancel.
#[derive(Debug)]
pub struct SubscriptionHandle {
    bus: EventBus,
    uid: String,
    id: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, Topics> {
        self.inner.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribes to every event of producer `uid`.
    pub fn subscribe(&self, uid: &str) -> (SubscriptionHandle, UnboundedReceiver<ProducerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics().entry(uid.to_string()).or_default().push((id, tx));
        let handle = SubscriptionHandle {
            bus: self.clone(),
            uid: uid.to_string(),
            id,
        };
        (handle, rx)
    }

    /// Delivers `event` to the subscribers of its producer and returns how
    /// many received it.
    pub fn publish(&self, event: ProducerEvent) -> usize {
        let mut topics = self.topics();
        let Some(subscribers) = topics.get_mut(event.producer_uid()) else {
            return 0;
        };
        subscribers.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0;
        for (_, tx) in subscribers.iter() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live subscriptions for producer `uid`.
    pub fn subscriber_count(&self, uid: &str) -> usize {
        self.topics()
            .get(uid)
            .map_or(0, |subs| subs.iter().filter(|(_, tx)| !tx.is_closed()).count())
    }

    fn unsubscribe(&self, uid: &str, id: u64) {
        let mut topics = self.topics();
        if let Some(subscribers) = topics.get_mut(uid) {
            subscribers.retain(|(sub, _)| *sub != id);
            if subscribers.is_empty() {
                topics.remove(uid);
            }
        }
    }
}

impl SubscriptionHandle {
    /// Stops delivery. Events already queued stay in the receiver.
    pub fn cancel(&self) {
        self.bus.unsubscribe(&self.uid, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obshub_types::SystemDescription;

    fn changed(uid: &str) -> ProducerEvent {
        ProducerEvent::DescriptionChanged {
            producer_uid: uid.to_string(),
            description: SystemDescription::new(uid, uid, chrono::Utc::now()),
        }
    }

    #[tokio::test]
    async fn events_reach_only_their_topic() {
        let bus = EventBus::new();
        let (_a, mut rx_a) = bus.subscribe("urn:a");
        let (_b, mut rx_b) = bus.subscribe("urn:b");

        assert_eq!(bus.publish(changed("urn:a")), 1);
        assert_eq!(bus.publish(changed("urn:nobody")), 0);

        assert_eq!(rx_a.recv().await.map(|e| e.producer_uid().to_string()), Some("urn:a".into()));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_stops_delivery() {
        let bus = EventBus::new();
        let (handle, mut rx) = bus.subscribe("urn:a");
        bus.publish(changed("urn:a"));
        handle.cancel();

        assert_eq!(bus.subscriber_count("urn:a"), 0);
        assert_eq!(bus.publish(changed("urn:a")), 0);
        assert!(rx.recv().await.is_some(), "queued event is kept");
        assert!(rx.recv().await.is_none(), "channel closes after cancel");
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let (_handle, rx) = bus.subscribe("urn:a");
        drop(rx);
        assert_eq!(bus.subscriber_count("urn:a"), 0);
        assert_eq!(bus.publish(changed("urn:a")), 0);
    }
}
