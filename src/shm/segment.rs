//! `mmap`-backed shared memory segment.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::Deref;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::error::ShmError;

use super::{remove_file_if_exists, OpenMode, SegmentLock, ShmConfig, ShmSafe};

/// "KYROBUS1"
const SEGMENT_MAGIC: u64 = 0x4B59_524F_4255_5331;
const LAYOUT_VERSION: u32 = 1;

#[repr(C)]
struct SegmentHeader {
    magic: u64,
    payload_size: u64,
    payload_offset: u64,
    version: u32,
    ready: AtomicU32,
}

/// A value of type `T` placed in a named, process-shared memory segment.
///
/// The creating process owns the segment and unlinks it on drop; attached
/// processes only unmap their view.
pub struct SharedMemory<T: ShmSafe> {
    name: String,
    path: PathBuf,
    base: NonNull<u8>,
    len: usize,
    owner: Option<SegmentLock>,
    _marker: PhantomData<T>,
}

// SAFETY: the mapping is process-wide and `T: ShmSafe` guarantees the value
// is only mutated through atomics, so handing the view to other threads is
// sound.
unsafe impl<T: ShmSafe> Send for SharedMemory<T> {}
// SAFETY: see above; `&SharedMemory<T>` only ever yields `&T` and `T: Sync`.
unsafe impl<T: ShmSafe> Sync for SharedMemory<T> {}

impl<T: ShmSafe> SharedMemory<T> {
    const fn payload_offset() -> usize {
        let header = size_of::<SegmentHeader>();
        let align = align_of::<T>();
        (header + align - 1) / align * align
    }

    const fn segment_len() -> usize {
        Self::payload_offset() + size_of::<T>()
    }

    /// Create or attach to the segment `name` according to `cfg.open_mode`.
    ///
    /// `init` is only called when this call creates the segment.
    pub fn open(name: &str, cfg: &ShmConfig, init: impl FnOnce() -> T) -> Result<Self, ShmError> {
        let path = cfg.segment_path(name)?;

        match cfg.open_mode {
            OpenMode::ExclusiveCreate => Self::create(name, path, cfg.permissions, init),
            OpenMode::PurgeAndCreate => {
                let lock = Self::acquire_owner(name, &path)?;
                if remove_file_if_exists(&path)? {
                    warn!(segment = name, "purged stale shared memory segment");
                }
                Self::create_locked(name, path, cfg.permissions, lock, init)
            }
            OpenMode::OpenOrCreate => match Self::create(name, path.clone(), cfg.permissions, init) {
                Err(ShmError::AlreadyExists { .. }) => Self::attach(name, path),
                other => other,
            },
            OpenMode::OpenExisting => Self::attach(name, path),
        }
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process created (and owns) the segment.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.owner.is_some()
    }

    fn acquire_owner(name: &str, path: &Path) -> Result<SegmentLock, ShmError> {
        SegmentLock::acquire(path).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                ShmError::AlreadyExists { name: name.to_string() }
            } else {
                ShmError::io("lock", e)
            }
        })
    }

    fn create(name: &str, path: PathBuf, permissions: u32, init: impl FnOnce() -> T) -> Result<Self, ShmError> {
        let lock = Self::acquire_owner(name, &path)?;
        Self::create_locked(name, path, permissions, lock, init)
    }

    fn create_locked(
        name: &str,
        path: PathBuf,
        permissions: u32,
        lock: SegmentLock,
        init: impl FnOnce() -> T,
    ) -> Result<Self, ShmError> {
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(permissions)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ShmError::AlreadyExists { name: name.to_string() });
            }
            Err(e) => {
                return Err(ShmError::io("create", e));
            }
        };

        let len = Self::segment_len();
        let base = match file
            .set_len(len as u64)
            .map_err(|e| ShmError::io("truncate", e))
            .and_then(|()| map(&file, len))
        {
            Ok(base) => base,
            Err(e) => {
                let _ = remove_file_if_exists(&path);
                return Err(e);
            }
        };

        // SAFETY: `base` points to `len` freshly mapped, writable bytes. The
        // header sits at offset 0 (page aligned) and the payload at an offset
        // aligned for `T`. Nobody reads the payload before `ready` is set.
        unsafe {
            base.as_ptr().cast::<SegmentHeader>().write(SegmentHeader {
                magic: SEGMENT_MAGIC,
                payload_size: size_of::<T>() as u64,
                payload_offset: Self::payload_offset() as u64,
                version: LAYOUT_VERSION,
                ready: AtomicU32::new(0),
            });
            base.as_ptr().add(Self::payload_offset()).cast::<T>().write(init());
        }

        let segment = Self {
            name: name.to_string(),
            path,
            base,
            len,
            owner: Some(lock),
            _marker: PhantomData,
        };
        segment.header().ready.store(1, Ordering::Release);

        debug!(segment = name, len, "created shared memory segment");
        Ok(segment)
    }

    fn attach(name: &str, path: PathBuf) -> Result<Self, ShmError> {
        let file = OpenOptions::new().read(true).write(true).open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ShmError::DoesNotExist { name: name.to_string() }
            } else {
                ShmError::io("open", e)
            }
        })?;

        let expected = Self::segment_len();
        let actual = file.metadata().map_err(|e| ShmError::io("stat", e))?.len();
        if actual != expected as u64 {
            return Err(ShmError::SizeMismatch {
                name: name.to_string(),
                expected,
                actual: usize::try_from(actual).unwrap_or(usize::MAX),
            });
        }

        let base = map(&file, expected)?;
        let segment = Self {
            name: name.to_string(),
            path,
            base,
            len: expected,
            owner: None,
            _marker: PhantomData,
        };

        let header = segment.header();
        let compatible = header.ready.load(Ordering::Acquire) == 1
            && header.magic == SEGMENT_MAGIC
            && header.version == LAYOUT_VERSION
            && header.payload_size == size_of::<T>() as u64
            && header.payload_offset == Self::payload_offset() as u64;
        if !compatible {
            return Err(ShmError::IncompatibleLayout { name: name.to_string() });
        }

        debug!(segment = name, "attached to shared memory segment");
        Ok(segment)
    }

    fn header(&self) -> &SegmentHeader {
        // SAFETY: the mapping is at least `segment_len()` bytes and starts
        // with a `SegmentHeader` whose mutable field is atomic.
        unsafe { &*self.base.as_ptr().cast::<SegmentHeader>() }
    }
}

impl<T: ShmSafe> Deref for SharedMemory<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the payload was initialised before `ready` was published
        // (creator) or `ready` was observed set (attacher), and `T: ShmSafe`
        // allows shared access.
        unsafe { &*self.base.as_ptr().add(Self::payload_offset()).cast::<T>() }
    }
}

impl<T: ShmSafe> fmt::Debug for SharedMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("len", &self.len)
            .field("owner", &self.owner.is_some())
            .finish()
    }
}

impl<T: ShmSafe> Drop for SharedMemory<T> {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe a mapping created by `map` and not
        // yet unmapped; no references into it outlive `self`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }

        if let Some(lock) = self.owner.take() {
            if let Err(e) = remove_file_if_exists(&self.path) {
                warn!(segment = %self.name, error = %e, "failed to unlink shared memory segment");
            }
            // Unlink before unlocking so a successor never sees our segment.
            drop(lock);
        }
    }
}

fn map(file: &File, len: usize) -> Result<NonNull<u8>, ShmError> {
    // SAFETY: mapping a regular file we hold open with read/write access;
    // the kernel validates `len` against the descriptor.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(ShmError::io("mmap", io::Error::last_os_error()));
    }

    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| ShmError::io("mmap", io::Error::from(ErrorKind::Other)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;
    use tempfile::tempdir;

    #[repr(C)]
    struct Counter {
        value: AtomicU64,
    }

    // SAFETY: repr(C), atomics only.
    unsafe impl ShmSafe for Counter {}

    fn counter() -> Counter {
        Counter { value: AtomicU64::new(7) }
    }

    #[test]
    fn test_create_then_attach_shares_memory() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path());

        let owner = SharedMemory::open("counter", &cfg, counter).unwrap();
        assert!(owner.is_owner());
        assert_eq!(owner.value.load(Ordering::SeqCst), 7);

        let attach_cfg = cfg.clone().with_open_mode(OpenMode::OpenExisting);
        let view = SharedMemory::<Counter>::open("counter", &attach_cfg, || unreachable!()).unwrap();
        assert!(!view.is_owner());

        view.value.fetch_add(1, Ordering::SeqCst);
        assert_eq!(owner.value.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_exclusive_create_fails_when_owned() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path()).with_open_mode(OpenMode::ExclusiveCreate);

        let _owner = SharedMemory::open("seg", &cfg, counter).unwrap();
        let err = SharedMemory::open("seg", &cfg, counter).unwrap_err();
        assert!(matches!(err, ShmError::AlreadyExists { .. }));
    }

    #[test]
    fn test_purge_and_create_replaces_stale_segment() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path());

        // A backing file left behind by a dead owner: no lock is held.
        std::fs::write(dir.path().join("stale"), b"garbage").unwrap();

        let seg = SharedMemory::open("stale", &cfg, counter).unwrap();
        assert_eq!(seg.value.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_open_or_create_attaches_to_existing() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path()).with_open_mode(OpenMode::OpenOrCreate);

        let first = SharedMemory::open("shared", &cfg, counter).unwrap();
        let second = SharedMemory::open("shared", &cfg, || Counter { value: AtomicU64::new(99) }).unwrap();

        assert!(first.is_owner());
        assert!(!second.is_owner());
        assert_eq!(second.value.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_open_existing_missing_segment() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path()).with_open_mode(OpenMode::OpenExisting);

        let err = SharedMemory::<Counter>::open("missing", &cfg, counter).unwrap_err();
        assert!(matches!(err, ShmError::DoesNotExist { .. }));
    }

    #[test]
    fn test_attach_rejects_wrong_size() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("odd"), [0u8; 3]).unwrap();
        let cfg = ShmConfig::in_directory(dir.path()).with_open_mode(OpenMode::OpenExisting);

        let err = SharedMemory::<Counter>::open("odd", &cfg, counter).unwrap_err();
        assert!(matches!(err, ShmError::SizeMismatch { .. }));
    }

    #[test]
    fn test_owner_drop_unlinks_segment() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path());

        let seg = SharedMemory::open("gone", &cfg, counter).unwrap();
        assert!(cfg.exists("gone").unwrap());
        drop(seg);
        assert!(!cfg.exists("gone").unwrap());
    }

    #[test]
    fn test_new_owner_takes_over_after_drop() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path()).with_open_mode(OpenMode::ExclusiveCreate);

        let first = SharedMemory::open("relay", &cfg, counter).unwrap();
        let lock_path = SegmentLock::lock_path(first.path());
        assert!(SharedMemory::open("relay", &cfg, counter).is_err());
        assert!(lock_path.exists());
        drop(first);

        assert!(lock_path.exists());
        let second = SharedMemory::open("relay", &cfg, counter).unwrap();
        assert!(second.is_owner());
        assert!(SharedMemory::open("relay", &cfg, counter).is_err());
    }
}
