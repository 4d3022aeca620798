//! Registry transport.
//!
//! The registry is replicated by sending whole snapshots. Only the most
//! recent snapshot matters, so the in-process channel keeps at most one
//! pending value and a newer publish replaces an unread one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use tracing::trace;

use crate::trigger::{EventKind, EventOrigin, TriggerHandle};

use super::ServiceRegistry;

/// Events raised by a registry subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberEvent {
    /// A new snapshot is waiting to be taken.
    DataReceived,
}

impl EventKind for SubscriberEvent {
    fn discriminant(self) -> u64 {
        self as u64
    }
}

/// Receiving end of a registry transport.
///
/// Implementations must be attachable to a listener so discovery can be
/// notified when a new snapshot arrives.
pub trait RegistrySubscriber: EventOrigin<Event = SubscriberEvent> {
    /// Take the latest unread snapshot, if any.
    fn take(&self) -> Option<ServiceRegistry>;

    /// Whether an unread snapshot is waiting.
    fn has_data(&self) -> bool;
}

type SharedTrigger = Arc<Mutex<TriggerHandle>>;

fn lock(trigger: &SharedTrigger) -> MutexGuard<'_, TriggerHandle> {
    trigger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a connected publisher/subscriber pair.
#[must_use]
pub fn registry_channel() -> (RegistryPublisher, RegistryReceiver) {
    let (tx, rx) = bounded(1);
    let trigger = SharedTrigger::default();

    let publisher = RegistryPublisher {
        tx,
        stale: rx.clone(),
        trigger: Arc::clone(&trigger),
    };
    (publisher, RegistryReceiver { rx, trigger })
}

/// Sending end of [`registry_channel`].
#[derive(Debug, Clone)]
pub struct RegistryPublisher {
    tx: Sender<ServiceRegistry>,
    stale: Receiver<ServiceRegistry>,
    trigger: SharedTrigger,
}

impl RegistryPublisher {
    /// Publish a snapshot, replacing one the subscriber has not taken yet.
    pub fn publish(&self, registry: ServiceRegistry) {
        let mut pending = registry;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    if self.stale.try_recv().is_ok() {
                        trace!("replaced unread registry snapshot");
                    }
                    pending = back;
                }
                // The publisher holds a receiver, so the channel outlives it.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }

        lock(&self.trigger).signal();
    }
}

/// Receiving end of [`registry_channel`].
#[derive(Debug)]
pub struct RegistryReceiver {
    rx: Receiver<ServiceRegistry>,
    trigger: SharedTrigger,
}

impl RegistryReceiver {
    /// Whether the receiver is attached to a listener.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        lock(&self.trigger).is_valid()
    }
}

impl RegistrySubscriber for RegistryReceiver {
    fn take(&self) -> Option<ServiceRegistry> {
        match self.rx.try_recv() {
            Ok(registry) => Some(registry),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    fn has_data(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl EventOrigin for RegistryReceiver {
    type Event = SubscriberEvent;

    fn enable_event(&self, handle: TriggerHandle, _event: Option<SubscriberEvent>) {
        let mut stored = lock(&self.trigger);
        *stored = handle;
        // A publish signals under this lock, so checking here cannot miss a
        // snapshot sent before the new handle was stored.
        if self.has_data() {
            stored.signal();
        }
    }

    fn disable_event(&self, _event: Option<SubscriberEvent>) {
        lock(&self.trigger).reset();
    }

    fn invalidate_trigger(&self, unique_id: u64) {
        let mut stored = lock(&self.trigger);
        if stored.unique_id() == unique_id {
            stored.invalidate();
        }
    }

    fn is_condition_satisfied(&self, _event: Option<SubscriberEvent>) -> bool {
        self.has_data()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::thread;

    use super::*;
    use crate::discovery::ServiceDescription;
    use crate::event_variable::EventVariable;
    use crate::trigger::handle::{next_trigger_id, TriggerOwner};

    fn registry_of(service: &str) -> ServiceRegistry {
        ServiceRegistry::from_descriptions([ServiceDescription::new(service, "i", "e").unwrap()]).unwrap()
    }

    #[test]
    fn test_take_is_empty_before_publish() {
        let (_publisher, receiver) = registry_channel();
        assert!(!receiver.has_data());
        assert!(receiver.take().is_none());
    }

    #[test]
    fn test_newer_snapshot_replaces_unread_one() {
        let (publisher, receiver) = registry_channel();
        publisher.publish(registry_of("A"));
        publisher.publish(registry_of("B"));

        assert!(receiver.has_data());
        let taken = receiver.take().unwrap();
        assert_eq!(taken.entries()[0].description.service.as_str(), "B");
        assert!(receiver.take().is_none());
    }

    #[test]
    fn test_publish_without_attachment_does_not_block() {
        let (publisher, receiver) = registry_channel();
        for _ in 0..10 {
            publisher.publish(ServiceRegistry::new());
        }
        assert!(!receiver.is_attached());
        assert!(receiver.is_condition_satisfied(None));
    }

    #[test]
    fn test_publish_racing_attach_always_signals() {
        struct NoOwner;

        impl TriggerOwner for NoOwner {
            fn release_trigger(&self, _unique_id: u64) {}
        }

        for _ in 0..2_000 {
            let (publisher, receiver) = registry_channel();
            let variable = EventVariable::new("race");
            let owner = Weak::<NoOwner>::new() as Weak<dyn TriggerOwner>;
            let handle = TriggerHandle::new(variable.notifier(0).unwrap(), owner, next_trigger_id());

            thread::scope(|scope| {
                scope.spawn(|| publisher.publish(ServiceRegistry::new()));
                receiver.enable_event(handle, Some(SubscriberEvent::DataReceived));
            });

            // Pending data must have woken the attached handle.
            assert!(receiver.has_data());
            assert!(variable.drain().contains(0));
        }
    }

    #[test]
    fn test_subscriber_event_discriminant_is_stable() {
        assert_eq!(SubscriberEvent::DataReceived.discriminant(), 0);
    }
}
