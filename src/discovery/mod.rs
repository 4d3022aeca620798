//! Service discovery.
//!
//! A [`ServiceRegistry`] lists every offered (service, instance, event)
//! triple. It is distributed as whole snapshots over a
//! [`RegistrySubscriber`]; [`ServiceDiscovery`] keeps the latest one and
//! answers wildcard lookups against it.

mod channel;
mod id_string;
mod registry;
mod service_discovery;

pub use channel::{registry_channel, RegistryPublisher, RegistryReceiver, RegistrySubscriber, SubscriberEvent};
pub use id_string::{IdString, MAX_ID_STRING_LENGTH};
pub use registry::{RegistryEntry, ServiceDescription, ServiceRegistry, MAX_SERVICE_REGISTRY_ENTRIES};
pub use service_discovery::{ServiceContainer, ServiceDiscovery};
