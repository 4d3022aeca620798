use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EventOrigin, NoEvent, TriggerHandle};

/// Origin whose event is raised explicitly by user code.
///
/// Can be attached to one listener at a time; attaching it elsewhere
/// releases the previous attachment.
#[derive(Debug, Default)]
pub struct UserTrigger {
    handle: Mutex<TriggerHandle>,
    triggered: AtomicBool,
}

impl UserTrigger {
    /// Create a detached trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the event.
    ///
    /// Records the occurrence even while detached so
    /// [`has_triggered`](Self::has_triggered) reports it.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.handle().signal();
    }

    /// Report and clear a pending occurrence.
    pub fn has_triggered(&self) -> bool {
        self.triggered.swap(false, Ordering::AcqRel)
    }

    /// Forget a pending occurrence.
    pub fn reset_trigger(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    /// Whether the trigger is attached to a listener.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.handle().is_valid()
    }

    fn handle(&self) -> MutexGuard<'_, TriggerHandle> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventOrigin for UserTrigger {
    type Event = NoEvent;

    fn enable_event(&self, handle: TriggerHandle, _event: Option<NoEvent>) {
        *self.handle() = handle;
    }

    fn disable_event(&self, _event: Option<NoEvent>) {
        self.handle().reset();
    }

    fn invalidate_trigger(&self, unique_id: u64) {
        let mut handle = self.handle();
        if handle.unique_id() == unique_id {
            handle.invalidate();
        }
    }

    fn is_condition_satisfied(&self, _event: Option<NoEvent>) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_trigger_still_records_occurrence() {
        let trigger = UserTrigger::new();
        assert!(!trigger.is_attached());

        trigger.trigger();
        assert!(trigger.is_condition_satisfied(None));
        assert!(trigger.has_triggered());
        assert!(!trigger.has_triggered());
    }

    #[test]
    fn test_reset_trigger_clears_pending() {
        let trigger = UserTrigger::new();
        trigger.trigger();
        trigger.reset_trigger();
        assert!(!trigger.is_condition_satisfied(None));
    }

    #[test]
    fn test_invalidate_with_foreign_id_keeps_handle() {
        let trigger = UserTrigger::new();
        trigger.invalidate_trigger(42);
        assert!(!trigger.is_attached());
    }
}
