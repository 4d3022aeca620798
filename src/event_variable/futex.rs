//! Process-shared wait/wake on a 32-bit word.
//!
//! Linux uses a non-private `futex` so waiters and wakers may sit in
//! different processes mapping the same memory. Other platforms fall back to
//! a short sleeping poll; callers always re-check their condition anyway.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Block while `*word == expected`, at most `timeout` if given.
///
/// May return spuriously.
#[cfg(target_os = "linux")]
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: libc::time_t::try_from(d.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_nsec: libc::c_long::try_from(d.subsec_nanos()).unwrap_or(0),
    });
    let ts_ptr = ts.as_ref().map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: `word` is a live, 4-byte aligned atomic for the duration of the
    // call; the kernel only reads it. EINTR/EAGAIN/ETIMEDOUT are all handled
    // by the caller re-checking its condition.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            (word as *const AtomicU32).cast::<u32>(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
        );
    }
}

/// Wake every waiter blocked on `word`.
#[cfg(target_os = "linux")]
pub(crate) fn wake_all(word: &AtomicU32) {
    // SAFETY: see `wait`.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            (word as *const AtomicU32).cast::<u32>(),
            libc::FUTEX_WAKE,
            i32::MAX,
        );
    }
}

#[cfg(not(target_os = "linux"))]
const POLL_INTERVAL: Duration = Duration::from_micros(500);

#[cfg(not(target_os = "linux"))]
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    use std::sync::atomic::Ordering;

    if word.load(Ordering::Acquire) != expected {
        return;
    }
    let nap = timeout.map_or(POLL_INTERVAL, |t| t.min(POLL_INTERVAL));
    std::thread::sleep(nap);
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wake_all(_word: &AtomicU32) {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_wait_returns_immediately_on_changed_word() {
        let word = AtomicU32::new(1);
        let start = Instant::now();
        wait(&word, 0, Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_honours_timeout() {
        let word = AtomicU32::new(0);
        let start = Instant::now();
        wait(&word, 0, Some(Duration::from_millis(20)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_wake_releases_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let waiter = {
            let word = Arc::clone(&word);
            thread::spawn(move || {
                while word.load(Ordering::Acquire) == 0 {
                    wait(&word, 0, Some(Duration::from_millis(100)));
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        word.store(1, Ordering::Release);
        wake_all(&word);
        waiter.join().unwrap();
    }
}
