//! Shared notification variable.
//!
//! An event variable is a fixed set of occurrence flags and a wake-up word.
//! Any number of [`EventNotifier`]s, possibly in other processes, set flags;
//! exactly one [`EventWaiter`] blocks until something is set and drains the
//! flags in one atomic step.
//!
//! The variable lives either in process-local memory ([`EventVariable::new`])
//! or in a named shared memory segment ([`EventVariable::open_shared`]) so
//! independent processes can signal the same listener.

mod data;
mod fired;
mod futex;

pub use data::EventVariableData;
pub use fired::{FiredIndices, FiredIter};

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use crate::error::ShmError;
#[cfg(unix)]
use crate::shm::{SharedMemory, ShmConfig};

/// Maximum number of events one listener can have attached.
pub const MAX_NUMBER_OF_EVENTS_PER_LISTENER: usize = 256;

/// Maximum length of an event variable's diagnostic tag in bytes.
pub const MAX_EVENT_VARIABLE_TAG_LENGTH: usize = 64;

pub(crate) const FLAG_WORDS: usize = MAX_NUMBER_OF_EVENTS_PER_LISTENER / 64;

enum Storage {
    Local(EventVariableData),
    #[cfg(unix)]
    Shared(SharedMemory<EventVariableData>),
}

/// Cloneable handle to an event variable.
#[derive(Clone)]
pub struct EventVariable {
    storage: Arc<Storage>,
}

impl EventVariable {
    /// Process-local event variable.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            storage: Arc::new(Storage::Local(EventVariableData::new(tag))),
        }
    }

    /// Create or attach to the shared event variable `name`.
    ///
    /// The segment name doubles as the diagnostic tag.
    #[cfg(unix)]
    pub fn open_shared(name: &str, cfg: &ShmConfig) -> Result<Self, ShmError> {
        let segment = SharedMemory::open(name, cfg, || EventVariableData::new(name))?;
        Ok(Self {
            storage: Arc::new(Storage::Shared(segment)),
        })
    }

    /// Whether this variable is backed by a shared memory segment.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        !matches!(*self.storage, Storage::Local(_))
    }

    /// Returns true if both handles refer to the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Notifier bound to `index`, or `None` if `index` is out of range.
    #[must_use]
    pub fn notifier(&self, index: usize) -> Option<EventNotifier> {
        EventNotifier::new(self.clone(), index)
    }

    /// The wait side of this variable.
    #[must_use]
    pub fn waiter(&self) -> EventWaiter {
        EventWaiter {
            variable: self.clone(),
        }
    }
}

impl Deref for EventVariable {
    type Target = EventVariableData;

    fn deref(&self) -> &EventVariableData {
        match &*self.storage {
            Storage::Local(data) => data,
            #[cfg(unix)]
            Storage::Shared(segment) => &**segment,
        }
    }
}

impl fmt::Debug for EventVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventVariable")
            .field("tag", &self.tag())
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// Signals one index of an event variable.
///
/// This is the whole capability a remote origin needs: it does not know
/// about slots, callbacks or the listener that drains the variable.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    variable: EventVariable,
    index: usize,
}

impl EventNotifier {
    /// Bind to `index`; `None` if out of range.
    #[must_use]
    pub fn new(variable: EventVariable, index: usize) -> Option<Self> {
        (index < MAX_NUMBER_OF_EVENTS_PER_LISTENER).then_some(Self { variable, index })
    }

    /// Bind to a slot index the caller already checked against capacity.
    pub(crate) const fn bound(variable: EventVariable, index: usize) -> Self {
        Self { variable, index }
    }

    /// The bound index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Set the flag and wake the waiter. Never blocks.
    pub fn notify(&self) {
        self.variable.notify(self.index);
    }
}

/// Wait side of an event variable.
#[derive(Debug, Clone)]
pub struct EventWaiter {
    variable: EventVariable,
}

impl EventWaiter {
    /// Block until something fires or [`destroy`](Self::destroy) is called.
    pub fn wait(&self) -> FiredIndices {
        self.variable.wait()
    }

    /// Block for at most `timeout`.
    pub fn timed_wait(&self, timeout: Duration) -> FiredIndices {
        self.variable.timed_wait(timeout)
    }

    /// Wake the waiter for good; later waits return immediately.
    pub fn destroy(&self) {
        self.variable.request_stop();
    }

    /// Re-arm after [`destroy`](Self::destroy).
    pub fn reset(&self) {
        self.variable.clear_stop();
    }

    /// Whether [`destroy`](Self::destroy) was called and not reset.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.variable.is_stop_requested()
    }
}
