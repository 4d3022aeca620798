//! Owner lock for shared memory segments.
//!
//! The creating process holds an exclusive advisory lock on `<segment>.lock`
//! for as long as the segment lives. The kernel drops the lock when the
//! process exits, so a segment whose lock can be taken has no live owner and
//! may be purged.
//!
//! # Safety
//! - Lock is released when `SegmentLock` is dropped
//! - Lock file is created if it doesn't exist and is never removed, so every
//!   contender locks the same inode
//! - Non-blocking lock attempt with `WouldBlock` on contention

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Exclusive owner lock for one segment.
#[derive(Debug)]
pub struct SegmentLock {
    _file: File,
    path: PathBuf,
}

impl SegmentLock {
    /// Path of the lock file guarding `segment_path`.
    #[must_use]
    pub fn lock_path(segment_path: &Path) -> PathBuf {
        let mut name = segment_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take ownership of the segment at `segment_path`.
    ///
    /// # Errors
    /// - `ErrorKind::WouldBlock` if a live process owns the segment
    pub fn acquire(segment_path: &Path) -> IoResult<Self> {
        let path = Self::lock_path(segment_path);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Self::try_lock(&file)?;

        Ok(Self { _file: file, path })
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::unix::io::AsRawFd;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `file` for this call.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

        if result != 0 {
            let errno = IoError::last_os_error();
            if errno.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(IoError::new(
                    ErrorKind::WouldBlock,
                    "segment is owned by another process",
                ));
            }
            return Err(errno);
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock(_file: &File) -> IoResult<()> {
        Err(IoError::new(
            ErrorKind::Unsupported,
            "segment locking not supported on this platform",
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_acquire_release() {
        let dir = tempdir().unwrap();
        let segment = dir.path().join("seg");

        let lock = SegmentLock::acquire(&segment).unwrap();
        assert!(lock.path().exists());
        assert!(lock.path().to_string_lossy().ends_with("seg.lock"));
        let path = lock.path().to_path_buf();
        drop(lock);

        // The file stays so later contenders lock the same inode.
        assert!(path.exists());
        let again = SegmentLock::acquire(&segment).unwrap();
        assert_eq!(again.path(), path);
    }

    #[test]
    fn test_lock_prevents_double_acquire() {
        let dir = tempdir().unwrap();
        let segment = dir.path().join("seg");

        let _owner = SegmentLock::acquire(&segment).unwrap();

        let err = SegmentLock::acquire(&segment).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn test_failed_acquire_keeps_owner_lock_file() {
        let dir = tempdir().unwrap();
        let segment = dir.path().join("seg");

        let owner = SegmentLock::acquire(&segment).unwrap();
        for _ in 0..3 {
            assert!(SegmentLock::acquire(&segment).is_err());
        }

        assert!(owner.path().exists());
        let err = SegmentLock::acquire(&segment).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn test_unowned_after_drop() {
        let dir = tempdir().unwrap();
        let segment = dir.path().join("seg");

        {
            let _owner = SegmentLock::acquire(&segment).unwrap();
        }
        assert!(SegmentLock::acquire(&segment).is_ok());
    }
}
