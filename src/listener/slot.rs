//! Slot table of the listener.
//!
//! Each occupied slot remembers which (origin, discriminant) pair it serves,
//! the id of the trigger handed to the origin, a weak reference to the
//! origin and its callback. The table is sized once at construction; attach
//! and detach never allocate.

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::error::ListenerError;
use crate::trigger::EventOrigin;

/// Type-erased view of an attached origin.
pub(crate) trait ErasedOrigin: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn invalidate(&self, unique_id: u64);
}

impl<T: EventOrigin> ErasedOrigin for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn invalidate(&self, unique_id: u64) {
        self.invalidate_trigger(unique_id);
    }
}

/// `fn(&T)` with `T` erased.
#[derive(Clone, Copy)]
pub(crate) struct EventCallback {
    trampoline: fn(&dyn Any, *const ()),
    callback: *const (),
}

// SAFETY: `callback` is a function pointer stored as a raw pointer; function
// pointers are `Send + Sync`.
unsafe impl Send for EventCallback {}
// SAFETY: see above.
unsafe impl Sync for EventCallback {}

impl EventCallback {
    pub(crate) fn new<T: EventOrigin>(callback: fn(&T)) -> Self {
        Self {
            trampoline: trampoline::<T>,
            callback: callback as *const (),
        }
    }

    pub(crate) fn invoke(&self, origin: &dyn Any) {
        (self.trampoline)(origin, self.callback);
    }
}

fn trampoline<T: EventOrigin>(origin: &dyn Any, callback: *const ()) {
    let Some(origin) = origin.downcast_ref::<T>() else {
        return;
    };
    // SAFETY: `EventCallback::new::<T>` is the only place that pairs this
    // trampoline with a pointer, and it always stores an `fn(&T)`.
    let callback = unsafe { std::mem::transmute::<*const (), fn(&T)>(callback) };
    callback(origin);
}

/// Address-based identity of an origin.
pub(crate) fn origin_identity<T>(origin: &Arc<T>) -> usize {
    Arc::as_ptr(origin).cast::<()>() as usize
}

pub(crate) struct SlotEntry {
    origin_id: usize,
    discriminant: u64,
    trigger_id: u64,
    origin: Weak<dyn ErasedOrigin>,
    callback: EventCallback,
}

impl SlotEntry {
    pub(crate) fn new<T: EventOrigin>(origin: &Arc<T>, discriminant: u64, trigger_id: u64, callback: fn(&T)) -> Self {
        let weak: Weak<dyn ErasedOrigin> = Arc::downgrade(origin) as Weak<dyn ErasedOrigin>;
        Self {
            origin_id: origin_identity(origin),
            discriminant,
            trigger_id,
            origin: weak,
            callback: EventCallback::new(callback),
        }
    }

    pub(crate) const fn trigger_id(&self) -> u64 {
        self.trigger_id
    }

    fn matches(&self, origin_id: usize, discriminant: u64) -> bool {
        self.origin_id == origin_id && self.discriminant == discriminant
    }

    /// Tell the origin (if still alive) that its handle is dead.
    pub(crate) fn invalidate_origin(&self) {
        if let Some(origin) = self.origin.upgrade() {
            origin.invalidate(self.trigger_id);
        }
    }
}

/// What the collector needs to run one callback outside the table lock.
pub(crate) struct Dispatch {
    pub(crate) origin: Arc<dyn ErasedOrigin>,
    pub(crate) callback: EventCallback,
    pub(crate) trigger_id: u64,
}

impl Dispatch {
    pub(crate) fn run(&self) {
        self.callback.invoke(self.origin.as_any());
    }
}

pub(crate) struct SlotTable {
    slots: Vec<Option<SlotEntry>>,
    size: usize,
}

impl SlotTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            size: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) const fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn find(&self, origin_id: usize, discriminant: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.matches(origin_id, discriminant)))
    }

    /// Occupy the lowest free slot.
    pub(crate) fn insert(&mut self, entry: SlotEntry) -> Result<usize, ListenerError> {
        if let Some(slot) = self.find(entry.origin_id, entry.discriminant) {
            return Err(ListenerError::EventAlreadyAttached { slot });
        }

        let capacity = self.capacity();
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(ListenerError::ListenerFull { capacity });
        };

        self.slots[slot] = Some(entry);
        self.size += 1;
        Ok(slot)
    }

    pub(crate) fn remove(&mut self, origin_id: usize, discriminant: u64) -> Option<(usize, SlotEntry)> {
        let slot = self.find(origin_id, discriminant)?;
        self.take(slot)
    }

    pub(crate) fn remove_by_trigger_id(&mut self, trigger_id: u64) -> Option<(usize, SlotEntry)> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.trigger_id == trigger_id))?;
        self.take(slot)
    }

    /// Remove any occupied slot, lowest index first.
    pub(crate) fn take_any(&mut self) -> Option<(usize, SlotEntry)> {
        let slot = self.slots.iter().position(Option::is_some)?;
        self.take(slot)
    }

    pub(crate) fn dispatch_for(&self, slot: usize) -> Option<Dispatch> {
        let entry = self.slots.get(slot)?.as_ref()?;
        let origin = entry.origin.upgrade()?;
        Some(Dispatch {
            origin,
            callback: entry.callback,
            trigger_id: entry.trigger_id,
        })
    }

    fn take(&mut self, slot: usize) -> Option<(usize, SlotEntry)> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.size -= 1;
        Some((slot, entry))
    }
}
