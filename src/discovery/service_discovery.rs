use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::trigger::{EventOrigin, TriggerHandle};

use super::{IdString, RegistrySubscriber, ServiceDescription, ServiceRegistry, SubscriberEvent};

/// Result of a service lookup.
pub type ServiceContainer = Vec<ServiceDescription>;

/// Queries a locally cached copy of the service registry.
///
/// Each query first takes the newest snapshot from the subscriber, if one
/// arrived, and then searches the cache. Refreshing and swapping the cache
/// happen under one lock so concurrent queries never observe a torn update.
/// The search itself runs on a frozen snapshot outside the lock.
///
/// Attach a `ServiceDiscovery` to a listener with
/// [`SubscriberEvent::DataReceived`] to be called back on registry changes.
#[derive(Debug)]
pub struct ServiceDiscovery<S> {
    subscriber: S,
    cache: Mutex<Arc<ServiceRegistry>>,
}

impl<S: RegistrySubscriber> ServiceDiscovery<S> {
    /// Discovery over `subscriber` with an empty cache.
    pub fn new(subscriber: S) -> Self {
        Self {
            subscriber,
            cache: Mutex::new(Arc::new(ServiceRegistry::new())),
        }
    }

    /// Descriptions matching every present filter, in registry order.
    ///
    /// `None` acts as a wildcard.
    pub fn find_service(
        &self,
        service: Option<&IdString>,
        instance: Option<&IdString>,
        event: Option<&IdString>,
    ) -> ServiceContainer {
        let snapshot = self.refresh();
        snapshot
            .find(service, instance, event)
            .map(|entry| entry.description.clone())
            .collect()
    }

    /// Like [`find_service`](Self::find_service) but hands the result to
    /// `callable`. Without a callable the lookup is skipped.
    pub fn find_service_with<F>(
        &self,
        service: Option<&IdString>,
        instance: Option<&IdString>,
        event: Option<&IdString>,
        callable: Option<F>,
    ) where
        F: FnOnce(&ServiceContainer),
    {
        let Some(callable) = callable else {
            return;
        };
        let found = self.find_service(service, instance, event);
        callable(&found);
    }

    /// The cached registry after pulling any pending snapshot.
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.refresh()
    }

    /// The transport this discovery reads from.
    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    fn refresh(&self) -> Arc<ServiceRegistry> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registry) = self.subscriber.take() {
            debug!(services = registry.len(), "service registry snapshot updated");
            *cache = Arc::new(registry);
        }
        Arc::clone(&cache)
    }
}

impl<S: RegistrySubscriber> EventOrigin for ServiceDiscovery<S> {
    type Event = SubscriberEvent;

    fn enable_event(&self, handle: TriggerHandle, event: Option<SubscriberEvent>) {
        self.subscriber.enable_event(handle, event);
    }

    fn disable_event(&self, event: Option<SubscriberEvent>) {
        self.subscriber.disable_event(event);
    }

    fn invalidate_trigger(&self, unique_id: u64) {
        self.subscriber.invalidate_trigger(unique_id);
    }

    fn is_condition_satisfied(&self, _event: Option<SubscriberEvent>) -> bool {
        self.subscriber.has_data()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::discovery::registry_channel;

    fn id(s: &str) -> IdString {
        IdString::new(s).unwrap()
    }

    fn desc(s: &str, i: &str, e: &str) -> ServiceDescription {
        ServiceDescription::new(s, i, e).unwrap()
    }

    #[test]
    fn test_empty_cache_finds_nothing() {
        let (_publisher, receiver) = registry_channel();
        let discovery = ServiceDiscovery::new(receiver);
        assert!(discovery.find_service(None, None, None).is_empty());
    }

    #[test]
    fn test_cache_survives_until_next_snapshot() {
        let (publisher, receiver) = registry_channel();
        let discovery = ServiceDiscovery::new(receiver);

        publisher.publish(ServiceRegistry::from_descriptions([desc("A", "1", "x")]).unwrap());
        assert_eq!(discovery.find_service(None, None, None).len(), 1);
        // Nothing new published; the cached copy still answers.
        assert_eq!(discovery.find_service(Some(&id("A")), None, None).len(), 1);

        publisher.publish(ServiceRegistry::new());
        assert!(discovery.find_service(None, None, None).is_empty());
    }

    #[test]
    fn test_callable_variant_skips_without_callable() {
        let (publisher, receiver) = registry_channel();
        let discovery = ServiceDiscovery::new(receiver);
        publisher.publish(ServiceRegistry::from_descriptions([desc("A", "1", "x")]).unwrap());

        discovery.find_service_with(None, None, None, None::<fn(&ServiceContainer)>);
        // The snapshot was not consumed by the skipped lookup.
        assert!(discovery.is_condition_satisfied(None));

        let seen = Cell::new(0);
        discovery.find_service_with(None, None, None, Some(|found: &ServiceContainer| seen.set(found.len())));
        assert_eq!(seen.get(), 1);
    }
}
