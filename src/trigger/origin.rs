use super::TriggerHandle;

/// Discriminator used for attachments made without an event kind.
///
/// An [`EventKind`] whose discriminant equals this value collides with the
/// no-event attachment of the same origin.
pub const NO_EVENT_DISCRIMINANT: u64 = u64::MAX;

/// Event kinds an origin can raise.
pub trait EventKind: Copy + Send + Sync + 'static {
    /// Stable numeric discriminant used to tell attachments apart.
    fn discriminant(self) -> u64;
}

/// Event kind for origins that raise a single, unnamed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoEvent {}

impl EventKind for NoEvent {
    fn discriminant(self) -> u64 {
        match self {}
    }
}

/// Capability set a type needs to be attached to a listener.
///
/// The listener depends on nothing else. `None` as event means the
/// attachment was made without an event kind.
pub trait EventOrigin: Send + Sync + 'static {
    /// Distinguishable event kinds of this origin.
    type Event: EventKind;

    /// Store `handle` and signal it whenever `event` occurs.
    fn enable_event(&self, handle: TriggerHandle, event: Option<Self::Event>);

    /// Reset the handle stored for `event`, freeing its listener slot.
    fn disable_event(&self, event: Option<Self::Event>);

    /// Invalidate the stored handle whose id is `unique_id`, if any.
    ///
    /// Called by the listener when it ends the attachment.
    fn invalidate_trigger(&self, unique_id: u64);

    /// Whether the condition behind `event` currently holds.
    fn is_condition_satisfied(&self, _event: Option<Self::Event>) -> bool {
        false
    }
}

pub(crate) fn discriminant_of<E: EventKind>(event: Option<E>) -> u64 {
    event.map_or(NO_EVENT_DISCRIMINANT, EventKind::discriminant)
}
