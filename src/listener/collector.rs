//! Collector worker.
//!
//! Blocks on the event variable, then runs the callbacks of every fired slot
//! in ascending slot order. Callbacks run outside the slot table lock so
//! they may attach or detach.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, trace, warn};

use crate::event_variable::{EventWaiter, FiredIndices};

use super::ListenerShared;

pub(crate) fn collector_loop(shared: Arc<ListenerShared>, waiter: EventWaiter, poll_interval: Duration) {
    info!(tag = shared.variable.tag(), "listener collector started");

    while shared.running.load(Ordering::Acquire) {
        let fired = waiter.timed_wait(poll_interval);
        if fired.is_empty() {
            continue;
        }
        dispatch(&shared, fired);
    }

    info!(tag = shared.variable.tag(), "listener collector stopped");
}

fn dispatch(shared: &ListenerShared, fired: FiredIndices) {
    for slot in fired {
        if !shared.running.load(Ordering::Acquire) {
            return;
        }

        // Detached (or origin gone) between signal and wake-up: drop it.
        let Some(call) = shared.lock_table().dispatch_for(slot) else {
            trace!(slot, "fired slot is not occupied; skipped");
            continue;
        };

        trace!(slot, trigger_id = call.trigger_id, "dispatching event callback");
        if catch_unwind(AssertUnwindSafe(|| call.run())).is_err() {
            warn!(slot, trigger_id = call.trigger_id, "event callback panicked");
        }
    }
}
