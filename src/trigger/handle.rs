use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use crate::event_variable::EventNotifier;

/// Id reported by an invalid handle.
pub const INVALID_TRIGGER_ID: u64 = u64::MAX;

static NEXT_TRIGGER_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_trigger_id() -> u64 {
    NEXT_TRIGGER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Side of an attachment that owns the slot a handle signals.
pub(crate) trait TriggerOwner: Send + Sync {
    /// Free the slot bound to `unique_id` without calling back into the origin.
    fn release_trigger(&self, unique_id: u64);
}

struct Binding {
    notifier: EventNotifier,
    owner: Weak<dyn TriggerOwner>,
    unique_id: u64,
}

/// Move-only capability to signal one listener slot.
///
/// A handle is either valid (bound to a live slot) or invalid. Signaling an
/// invalid handle does nothing. Taking the handle out of a field with
/// `std::mem::take` leaves an invalid one behind.
///
/// Dropping a valid handle behaves like [`reset`](Self::reset).
#[derive(Default)]
pub struct TriggerHandle {
    binding: Option<Binding>,
}

impl TriggerHandle {
    pub(crate) fn new(notifier: EventNotifier, owner: Weak<dyn TriggerOwner>, unique_id: u64) -> Self {
        Self {
            binding: Some(Binding {
                notifier,
                owner,
                unique_id,
            }),
        }
    }

    /// Returns true if the handle is bound to a slot.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.binding.is_some()
    }

    /// Identity of the attachment, or [`INVALID_TRIGGER_ID`].
    #[must_use]
    pub fn unique_id(&self) -> u64 {
        self.binding.as_ref().map_or(INVALID_TRIGGER_ID, |b| b.unique_id)
    }

    /// Slot index this handle signals.
    #[must_use]
    pub fn slot(&self) -> Option<usize> {
        self.binding.as_ref().map(|b| b.notifier.index())
    }

    /// Set the slot's occurrence flag and wake the collector.
    ///
    /// Never blocks; no-op on an invalid handle.
    pub fn signal(&self) {
        if let Some(binding) = &self.binding {
            binding.notifier.notify();
        }
    }

    /// Mark the handle invalid without notifying the listener.
    ///
    /// Used when the listener itself ended the attachment. Idempotent.
    pub fn invalidate(&mut self) {
        self.binding = None;
    }

    /// Invalidate the handle and free the listener slot it was bound to.
    ///
    /// Idempotent. If the listener is already gone only the handle is
    /// invalidated.
    pub fn reset(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        if let Some(owner) = binding.owner.upgrade() {
            owner.release_trigger(binding.unique_id);
        }
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for TriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(b) => f
                .debug_struct("TriggerHandle")
                .field("unique_id", &b.unique_id)
                .field("slot", &b.notifier.index())
                .finish(),
            None => f.write_str("TriggerHandle(invalid)"),
        }
    }
}
