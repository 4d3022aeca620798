//! Event multiplexer.
//!
//! A [`Listener`] owns a bounded table of slots and one collector thread.
//! Attaching an origin occupies the lowest free slot and hands the origin a
//! [`TriggerHandle`] bound to that slot's flag in the listener's event
//! variable. When origins signal, the collector wakes and runs the stored
//! callbacks, lowest slot first.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kyrobus::{Listener, UserTrigger};
//!
//! let listener = Listener::new()?;
//! let trigger = Arc::new(UserTrigger::new());
//! listener.attach_event(&trigger, |t: &UserTrigger| println!("fired: {}", t.has_triggered()))?;
//! trigger.trigger();
//! ```

mod collector;
mod slot;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ListenerError;
use crate::event_variable::{EventNotifier, EventVariable, MAX_NUMBER_OF_EVENTS_PER_LISTENER};
use crate::trigger::handle::{next_trigger_id, TriggerOwner};
use crate::trigger::origin::discriminant_of;
use crate::trigger::{EventOrigin, TriggerHandle};

use slot::{origin_identity, SlotEntry, SlotTable};

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Maximum number of simultaneously attached events.
    pub capacity: usize,
    /// Name of the collector thread.
    pub thread_name: String,
    /// Upper bound on how long the collector sleeps before re-checking
    /// for shutdown, in milliseconds.
    pub stop_poll_interval_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_NUMBER_OF_EVENTS_PER_LISTENER,
            thread_name: "kyrobus-listener".to_string(),
            stop_poll_interval_ms: 50,
        }
    }
}

impl ListenerConfig {
    /// Default config with a different capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Check the capacity range.
    ///
    /// # Errors
    /// `InvalidCapacity` unless `1 <= capacity <= MAX_NUMBER_OF_EVENTS_PER_LISTENER`.
    pub fn validate(self) -> Result<Self, ListenerError> {
        if self.capacity == 0 || self.capacity > MAX_NUMBER_OF_EVENTS_PER_LISTENER {
            return Err(ListenerError::InvalidCapacity {
                requested: self.capacity,
                max: MAX_NUMBER_OF_EVENTS_PER_LISTENER,
            });
        }
        Ok(self)
    }

    fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms.max(1))
    }
}

pub(crate) struct ListenerShared {
    variable: EventVariable,
    table: Mutex<SlotTable>,
    running: AtomicBool,
}

impl ListenerShared {
    fn lock_table(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TriggerOwner for ListenerShared {
    fn release_trigger(&self, unique_id: u64) {
        let removed = self.lock_table().remove_by_trigger_id(unique_id);
        if let Some((slot, _entry)) = removed {
            self.variable.clear(slot);
            debug!(slot, trigger_id = unique_id, "origin released its attachment");
        }
    }
}

/// Bounded event multiplexer with a dedicated collector thread.
///
/// Attach and detach are meant to be called from the owning thread; origins
/// may signal from any thread or process at any time. Dropping the listener
/// stops the collector first, then invalidates every remaining handle.
pub struct Listener {
    shared: Arc<ListenerShared>,
    capacity: usize,
    collector: Option<JoinHandle<()>>,
}

impl Listener {
    /// Listener with a process-local event variable and default config.
    pub fn new() -> Result<Self, ListenerError> {
        Self::with_config(ListenerConfig::default())
    }

    /// Listener with a process-local event variable.
    pub fn with_config(cfg: ListenerConfig) -> Result<Self, ListenerError> {
        let variable = EventVariable::new(&cfg.thread_name);
        Self::with_event_variable(variable, cfg)
    }

    /// Listener draining `variable`, e.g. one placed in shared memory so
    /// other processes can notify it.
    pub fn with_event_variable(variable: EventVariable, cfg: ListenerConfig) -> Result<Self, ListenerError> {
        let cfg = cfg.validate()?;

        let shared = Arc::new(ListenerShared {
            variable,
            table: Mutex::new(SlotTable::with_capacity(cfg.capacity)),
            running: AtomicBool::new(true),
        });

        let waiter = shared.variable.waiter();
        waiter.reset();

        let thread_shared = Arc::clone(&shared);
        let poll_interval = cfg.stop_poll_interval();
        let collector = thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || collector::collector_loop(thread_shared, waiter, poll_interval))
            .map_err(|e| ListenerError::CollectorSpawn { message: e.to_string() })?;

        Ok(Self {
            shared,
            capacity: cfg.capacity,
            collector: Some(collector),
        })
    }

    /// Maximum number of simultaneous attachments.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.lock_table().size()
    }

    /// Returns true if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The event variable drained by this listener.
    #[must_use]
    pub fn event_variable(&self) -> &EventVariable {
        &self.shared.variable
    }

    /// Attach the single (unnamed) event of `origin`.
    ///
    /// # Errors
    /// - `ListenerFull` if every slot is occupied
    /// - `EventAlreadyAttached` if `origin` is already attached without an event
    pub fn attach_event<T: EventOrigin>(&self, origin: &Arc<T>, callback: fn(&T)) -> Result<(), ListenerError> {
        self.attach(origin, None, callback)
    }

    /// Attach `event` of `origin`.
    ///
    /// Attaching the same origin with different events, or with and
    /// without an event, yields independent slots.
    ///
    /// # Errors
    /// - `ListenerFull` if every slot is occupied
    /// - `EventAlreadyAttached` if `(origin, event)` is already attached
    pub fn attach_event_with<T: EventOrigin>(
        &self,
        origin: &Arc<T>,
        event: T::Event,
        callback: fn(&T),
    ) -> Result<(), ListenerError> {
        self.attach(origin, Some(event), callback)
    }

    /// Detach the unnamed event of `origin`. No-op if not attached.
    pub fn detach_event<T: EventOrigin>(&self, origin: &Arc<T>) {
        self.detach(origin, None);
    }

    /// Detach `event` of `origin`. No-op if not attached.
    pub fn detach_event_with<T: EventOrigin>(&self, origin: &Arc<T>, event: T::Event) {
        self.detach(origin, Some(event));
    }

    /// Whether `(origin, event)` currently occupies a slot.
    #[must_use]
    pub fn contains<T: EventOrigin>(&self, origin: &Arc<T>, event: Option<T::Event>) -> bool {
        self.shared
            .lock_table()
            .find(origin_identity(origin), discriminant_of(event))
            .is_some()
    }

    fn attach<T: EventOrigin>(
        &self,
        origin: &Arc<T>,
        event: Option<T::Event>,
        callback: fn(&T),
    ) -> Result<(), ListenerError> {
        let discriminant = discriminant_of(event);
        let trigger_id = next_trigger_id();

        let slot = self
            .shared
            .lock_table()
            .insert(SlotEntry::new(origin, discriminant, trigger_id, callback))?;

        // A signal left over from the previous occupant must not fire the new callback.
        self.shared.variable.clear(slot);

        let owner: Weak<dyn TriggerOwner> = Arc::downgrade(&self.shared) as Weak<dyn TriggerOwner>;
        let notifier = EventNotifier::bound(self.shared.variable.clone(), slot);
        origin.enable_event(TriggerHandle::new(notifier, owner, trigger_id), event);

        debug!(slot, trigger_id, discriminant, "event attached");
        Ok(())
    }

    fn detach<T: EventOrigin>(&self, origin: &Arc<T>, event: Option<T::Event>) {
        let discriminant = discriminant_of(event);
        let removed = self
            .shared
            .lock_table()
            .remove(origin_identity(origin), discriminant);

        let Some((slot, entry)) = removed else {
            return;
        };

        self.shared.variable.clear(slot);
        origin.invalidate_trigger(entry.trigger_id());
        debug!(slot, trigger_id = entry.trigger_id(), discriminant, "event detached");
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("variable", &self.shared.variable)
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // Stop the collector before touching the table so no callback runs
        // against a half torn-down listener.
        self.shared.running.store(false, Ordering::Release);
        let waiter = self.shared.variable.waiter();
        waiter.destroy();

        if let Some(handle) = self.collector.take() {
            if handle.join().is_err() {
                warn!("listener collector thread panicked");
            }
        }

        loop {
            let next = self.shared.lock_table().take_any();
            let Some((slot, entry)) = next else {
                break;
            };
            entry.invalidate_origin();
            debug!(slot, trigger_id = entry.trigger_id(), "event invalidated on listener drop");
        }

        waiter.reset();
    }
}
