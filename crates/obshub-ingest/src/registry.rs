//! Registry of known producers, announcing changes on a broadcast channel.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::producer::Producer;

/// Buffered registry notifications per receiver.
const REGISTRY_CHANNEL_CAPACITY: usize = 256;

/// A change in the set of producers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(String),
    Removed(String),
    Enabled(String),
    Disabled(String),
}

struct Entry {
    producer: Arc<dyn Producer>,
    enabled: bool,
}

/// Known producers and whether each is enabled.
pub struct ProducerRegistry {
    producers: RwLock<HashMap<String, Entry>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(REGISTRY_CHANNEL_CAPACITY);
        Self {
            producers: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: RegistryEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::debug!(event = ?e.0, "no registry listeners");
        }
    }

    /// Adds an enabled producer, replacing any producer with the same uid.
    pub fn register(&self, producer: Arc<dyn Producer>) {
        let uid = producer.uid().to_string();
        self.producers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uid.clone(), Entry { producer, enabled: true });
        tracing::debug!(uid = %uid, "registered producer");
        self.notify(RegistryEvent::Added(uid));
    }

    pub fn unregister(&self, uid: &str) -> bool {
        let removed = self
            .producers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(uid)
            .is_some();
        if removed {
            self.notify(RegistryEvent::Removed(uid.to_string()));
        }
        removed
    }

    /// Enables or disables a producer. Returns false for unknown uids.
    pub fn set_enabled(&self, uid: &str, enabled: bool) -> bool {
        let changed = {
            let mut producers = self.producers.write().unwrap_or_else(|e| e.into_inner());
            match producers.get_mut(uid) {
                None => return false,
                Some(entry) => std::mem::replace(&mut entry.enabled, enabled) != enabled,
            }
        };
        if changed {
            self.notify(if enabled {
                RegistryEvent::Enabled(uid.to_string())
            } else {
                RegistryEvent::Disabled(uid.to_string())
            });
        }
        true
    }

    /// The producer with unique id `uid`, if it is registered and enabled.
    pub fn get_enabled(&self, uid: &str) -> Option<Arc<dyn Producer>> {
        self.producers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(uid)
            .filter(|e| e.enabled)
            .map(|e| e.producer.clone())
    }

    pub fn enabled(&self) -> Vec<Arc<dyn Producer>> {
        let producers = self.producers.read().unwrap_or_else(|e| e.into_inner());
        let mut enabled: Vec<_> = producers
            .values()
            .filter(|e| e.enabled)
            .map(|e| e.producer.clone())
            .collect();
        enabled.sort_by(|a, b| a.uid().cmp(b.uid()));
        enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::OutputDescriptor;
    use obshub_types::SystemDescription;

    struct Named(&'static str);

    impl Producer for Named {
        fn uid(&self) -> &str {
            self.0
        }

        fn description(&self) -> SystemDescription {
            SystemDescription::new(self.0, self.0, chrono::Utc::now())
        }

        fn outputs(&self) -> Vec<OutputDescriptor> {
            Vec::new()
        }
    }

    #[test]
    fn changes_are_announced() {
        let registry = ProducerRegistry::new();
        let mut rx = registry.subscribe();

        registry.register(Arc::new(Named("urn:a")));
        assert!(registry.set_enabled("urn:a", false));
        assert!(registry.set_enabled("urn:a", false), "no change, still known");
        assert!(registry.set_enabled("urn:a", true));
        assert!(registry.unregister("urn:a"));
        assert!(!registry.set_enabled("urn:a", true));

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                RegistryEvent::Added("urn:a".into()),
                RegistryEvent::Disabled("urn:a".into()),
                RegistryEvent::Enabled("urn:a".into()),
                RegistryEvent::Removed("urn:a".into()),
            ]
        );
    }

    #[test]
    fn disabled_producers_are_hidden() {
        let registry = ProducerRegistry::new();
        registry.register(Arc::new(Named("urn:b")));
        registry.register(Arc::new(Named("urn:a")));
        registry.set_enabled("urn:b", false);

        assert!(registry.get_enabled("urn:b").is_none());
        let uids: Vec<String> = registry.enabled().iter().map(|p| p.uid().to_string()).collect();
        assert_eq!(uids, vec!["urn:a"]);
    }
}
