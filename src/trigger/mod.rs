//! Trigger handles and the origin capability set.
//!
//! A listener hands each attached origin a [`TriggerHandle`]. The origin
//! keeps it and calls [`TriggerHandle::signal`] whenever its condition
//! occurs. Either side may end the attachment: the listener invalidates the
//! handle through [`EventOrigin::invalidate_trigger`], the origin resets or
//! drops the handle, which frees the listener slot.

/// Trigger handle type.
pub mod handle;
/// Origin capability traits.
pub mod origin;
/// Ready-made user-driven origin.
pub mod user_trigger;

pub use handle::{TriggerHandle, INVALID_TRIGGER_ID};
pub use origin::{EventKind, EventOrigin, NoEvent, NO_EVENT_DISCRIMINANT};
pub use user_trigger::UserTrigger;
