//! # kyrobus - Event Notification Core for Zero-Copy Publish/Subscribe
//!
//! kyrobus lets a single background thread wait on many independent event
//! origins at once and run a callback for each one that fired. Origins may
//! live in the same process or signal through shared memory from another.
//!
//! ## Core Concepts
//!
//! - **EventVariable**: Fixed set of occurrence flags plus a wake-up word
//! - **TriggerHandle**: Move-only capability an origin uses to signal its slot
//! - **Listener**: Owns the slots and the collector thread that dispatches callbacks
//! - **ServiceDiscovery**: Cached registry of offered services, attachable to a listener
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kyrobus::{Listener, UserTrigger};
//!
//! let listener = Listener::new()?;
//! let trigger = Arc::new(UserTrigger::new());
//!
//! listener.attach_event(&trigger, |t: &UserTrigger| {
//!     if t.has_triggered() {
//!         println!("triggered");
//!     }
//! })?;
//!
//! trigger.trigger();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod discovery;
pub mod error;
pub mod event_variable;
pub mod listener;
pub mod shm;
pub mod trigger;

// Re-export primary types at crate root for convenience
pub use discovery::{
    registry_channel, IdString, RegistryPublisher, RegistryReceiver, RegistrySubscriber, ServiceContainer,
    ServiceDescription, ServiceDiscovery, ServiceRegistry, SubscriberEvent,
};
pub use error::{BusError, BusResult, DiscoveryError, ListenerError, ShmError};
pub use event_variable::{
    EventNotifier, EventVariable, EventWaiter, FiredIndices, MAX_NUMBER_OF_EVENTS_PER_LISTENER,
};
pub use listener::{Listener, ListenerConfig};
pub use shm::{OpenMode, ShmConfig};
pub use trigger::{EventKind, EventOrigin, NoEvent, TriggerHandle, UserTrigger, INVALID_TRIGGER_ID};
