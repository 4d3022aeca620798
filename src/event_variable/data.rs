use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::shm::ShmSafe;

use super::futex;
use super::{FiredIndices, FLAG_WORDS, MAX_EVENT_VARIABLE_TAG_LENGTH, MAX_NUMBER_OF_EVENTS_PER_LISTENER};

/// Occurrence flags plus a process-shared wake-up word.
///
/// This is the value that lives in shared memory. Notifiers set a flag and
/// bump `generation`; the single waiter snapshots `generation`, drains the
/// flags and only sleeps if `generation` is still unchanged, so a notify that
/// races with the waiter going to sleep is never lost.
#[repr(C)]
pub struct EventVariableData {
    generation: AtomicU32,
    stop: AtomicU32,
    flags: [AtomicU64; FLAG_WORDS],
    tag_len: u32,
    tag: [u8; MAX_EVENT_VARIABLE_TAG_LENGTH],
}

// SAFETY: repr(C), no pointers; everything mutated after construction is
// atomic and the tag is written once before the value is shared.
unsafe impl ShmSafe for EventVariableData {}

impl EventVariableData {
    /// Create an empty variable labelled `tag` for diagnostics.
    ///
    /// Tags longer than the maximum are truncated on a char boundary.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let mut end = tag.len().min(MAX_EVENT_VARIABLE_TAG_LENGTH);
        while !tag.is_char_boundary(end) {
            end -= 1;
        }

        let mut buf = [0u8; MAX_EVENT_VARIABLE_TAG_LENGTH];
        buf[..end].copy_from_slice(&tag.as_bytes()[..end]);

        Self {
            generation: AtomicU32::new(0),
            stop: AtomicU32::new(0),
            flags: std::array::from_fn(|_| AtomicU64::new(0)),
            tag_len: end as u32,
            tag: buf,
        }
    }

    /// Diagnostic tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        let len = (self.tag_len as usize).min(MAX_EVENT_VARIABLE_TAG_LENGTH);
        std::str::from_utf8(&self.tag[..len]).unwrap_or("")
    }

    /// Set the flag at `index` and wake the waiter.
    ///
    /// Never blocks. Repeated notifies before the waiter drains coalesce.
    pub fn notify(&self, index: usize) {
        if index >= MAX_NUMBER_OF_EVENTS_PER_LISTENER {
            warn!(tag = self.tag(), index, "notify index out of range; ignored");
            return;
        }

        self.flags[index / 64].fetch_or(1 << (index % 64), Ordering::Release);
        self.bump_and_wake();
    }

    /// Returns true if any flag is currently set.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.flags.iter().any(|w| w.load(Ordering::Acquire) != 0)
    }

    /// Request every waiter to return, with or without fired indices.
    pub fn request_stop(&self) {
        self.stop.store(1, Ordering::Release);
        self.bump_and_wake();
    }

    /// Clear a previous stop request.
    pub fn clear_stop(&self) {
        self.stop.store(0, Ordering::Release);
    }

    /// Whether a stop request is pending.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire) != 0
    }

    /// Block until at least one flag is set or a stop is requested.
    ///
    /// Returns the drained indices; empty only after a stop request.
    pub fn wait(&self) -> FiredIndices {
        loop {
            let seen = self.generation.load(Ordering::Acquire);
            let fired = self.drain();
            if !fired.is_empty() || self.is_stop_requested() {
                return fired;
            }
            futex::wait(&self.generation, seen, None);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns an empty set on timeout or stop.
    pub fn timed_wait(&self, timeout: Duration) -> FiredIndices {
        let deadline = Instant::now() + timeout;
        loop {
            let seen = self.generation.load(Ordering::Acquire);
            let fired = self.drain();
            if !fired.is_empty() || self.is_stop_requested() {
                return fired;
            }

            let now = Instant::now();
            if now >= deadline {
                return fired;
            }
            futex::wait(&self.generation, seen, Some(deadline - now));
        }
    }

    /// Atomically take and clear every set flag.
    pub fn drain(&self) -> FiredIndices {
        let mut words = [0u64; FLAG_WORDS];
        for (out, flag) in words.iter_mut().zip(&self.flags) {
            if flag.load(Ordering::Relaxed) != 0 {
                *out = flag.swap(0, Ordering::AcqRel);
            }
        }
        FiredIndices::from_words(words)
    }

    /// Clear the flag at `index` without dispatching it.
    pub fn clear(&self, index: usize) {
        if index < MAX_NUMBER_OF_EVENTS_PER_LISTENER {
            self.flags[index / 64].fetch_and(!(1 << (index % 64)), Ordering::AcqRel);
        }
    }

    fn bump_and_wake(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        futex::wake_all(&self.generation);
    }
}

impl fmt::Debug for EventVariableData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventVariableData")
            .field("tag", &self.tag())
            .field("stop", &self.is_stop_requested())
            .field("pending", &self.has_pending())
            .finish()
    }
}
