use std::sync::Arc;
use std::time::{Duration, Instant};

use kyrobus::{
    registry_channel, IdString, Listener, RegistryReceiver, RegistrySubscriber, ServiceContainer,
    ServiceDescription, ServiceDiscovery, ServiceRegistry, SubscriberEvent,
};

fn id(s: &str) -> IdString {
    IdString::new(s).unwrap()
}

fn desc(s: &str, i: &str, e: &str) -> ServiceDescription {
    ServiceDescription::new(s, i, e).unwrap()
}

fn two_services() -> ServiceRegistry {
    ServiceRegistry::from_descriptions([desc("A", "1", "x"), desc("B", "2", "y")]).unwrap()
}

#[test]
fn find_on_empty_cache_returns_nothing() {
    let (_publisher, receiver) = registry_channel();
    let discovery = ServiceDiscovery::new(receiver);

    assert!(discovery.find_service(None, None, None).is_empty());
    assert!(discovery.find_service(Some(&id("A")), None, None).is_empty());
}

#[test]
fn find_filters_latest_snapshot() {
    let (publisher, receiver) = registry_channel();
    let discovery = ServiceDiscovery::new(receiver);
    publisher.publish(two_services());

    assert_eq!(
        discovery.find_service(Some(&id("A")), None, None),
        vec![desc("A", "1", "x")]
    );
    assert_eq!(
        discovery.find_service(None, None, None),
        vec![desc("A", "1", "x"), desc("B", "2", "y")]
    );
    assert!(discovery
        .find_service(Some(&id("A")), Some(&id("2")), None)
        .is_empty());
}

#[test]
fn find_with_callable_receives_matches() {
    let (publisher, receiver) = registry_channel();
    let discovery = ServiceDiscovery::new(receiver);
    publisher.publish(two_services());

    let mut seen = Vec::new();
    discovery.find_service_with(
        None,
        None,
        Some(&id("y")),
        Some(|found: &ServiceContainer| seen.extend(found.iter().cloned())),
    );
    assert_eq!(seen, vec![desc("B", "2", "y")]);
}

#[test]
fn replaced_snapshot_is_never_observed() {
    let (publisher, receiver) = registry_channel();
    let discovery = ServiceDiscovery::new(receiver);

    publisher.publish(two_services());
    publisher.publish(ServiceRegistry::from_descriptions([desc("C", "3", "z")]).unwrap());

    assert_eq!(discovery.find_service(None, None, None), vec![desc("C", "3", "z")]);
}

fn refresh_on_change(discovery: &ServiceDiscovery<RegistryReceiver>) {
    let _ = discovery.registry();
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn attached_discovery_is_notified_on_publish() {
    let listener = Listener::new().unwrap();
    let (publisher, receiver) = registry_channel();
    let discovery = Arc::new(ServiceDiscovery::new(receiver));

    listener
        .attach_event_with(&discovery, SubscriberEvent::DataReceived, refresh_on_change)
        .unwrap();
    assert!(discovery.subscriber().is_attached());

    publisher.publish(two_services());
    // The callback is the only consumer, so a drained transport means it ran.
    wait_until(|| !discovery.subscriber().has_data());
    assert_eq!(discovery.registry().len(), 2);

    listener.detach_event_with(&discovery, SubscriberEvent::DataReceived);
    assert!(!discovery.subscriber().is_attached());
}

#[test]
fn snapshot_published_before_attach_is_delivered() {
    let listener = Listener::new().unwrap();
    let (publisher, receiver) = registry_channel();
    let discovery = Arc::new(ServiceDiscovery::new(receiver));

    publisher.publish(two_services());
    listener
        .attach_event_with(&discovery, SubscriberEvent::DataReceived, refresh_on_change)
        .unwrap();

    wait_until(|| !discovery.subscriber().has_data());
    assert_eq!(discovery.registry().len(), 2);
}
