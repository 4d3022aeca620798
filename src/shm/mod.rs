//! Named shared memory segments.
//!
//! A segment is a file-backed `mmap` holding exactly one `#[repr(C)]` value
//! that several processes can attach to by name. The creating process owns
//! the segment: it initialises the value in place, holds an advisory owner
//! lock for as long as it lives, and unlinks the backing file on drop.
//!
//! # Layout
//!
//! ```text
//! ┌────────────────────────┐ offset 0
//! │ SegmentHeader          │ magic, version, payload size, ready flag
//! ├────────────────────────┤ aligned to align_of::<T>()
//! │ T                      │ the shared value
//! └────────────────────────┘
//! ```

mod file_lock;
#[cfg(unix)]
mod segment;

pub use file_lock::SegmentLock;
#[cfg(unix)]
pub use segment::SharedMemory;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ShmError;

/// Maximum length of a segment name in bytes.
pub const MAX_SEGMENT_NAME_LENGTH: usize = 255;

/// Marker for types that may live in memory mapped by several processes.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain no pointers or process-local
/// handles, and stay valid when accessed concurrently through shared
/// references from independent address spaces (atomics only for mutation).
pub unsafe trait ShmSafe: Sync {}

/// How a segment is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Create a new segment; fail if one exists.
    ExclusiveCreate,
    /// Remove a stale segment whose owner is gone, then create.
    PurgeAndCreate,
    /// Open the segment if it exists, otherwise create it.
    OpenOrCreate,
    /// Open an existing segment; fail if it does not exist.
    OpenExisting,
}

impl OpenMode {
    /// Whether this mode may create the segment.
    #[must_use]
    pub const fn may_create(self) -> bool {
        !matches!(self, Self::OpenExisting)
    }
}

/// Configuration for shared memory segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    /// Directory holding the backing files.
    pub directory: PathBuf,
    /// Permission bits for newly created segments.
    pub permissions: u32,
    /// Open behaviour.
    pub open_mode: OpenMode,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            permissions: 0o600,
            open_mode: OpenMode::PurgeAndCreate,
        }
    }
}

impl ShmConfig {
    /// Config rooted at `directory` with default permissions and open mode.
    #[must_use]
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Same config with a different open mode.
    #[must_use]
    pub fn with_open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }

    /// Path of the backing file for `name`.
    pub fn segment_path(&self, name: &str) -> Result<PathBuf, ShmError> {
        validate_name(name)?;
        Ok(self.directory.join(name))
    }

    /// Returns true if a segment called `name` exists.
    pub fn exists(&self, name: &str) -> Result<bool, ShmError> {
        let path = self.segment_path(name)?;
        path.try_exists().map_err(|e| ShmError::io("stat", e))
    }

    /// Unlink the segment called `name`.
    ///
    /// Returns `Ok(false)` if there was nothing to remove. Processes that
    /// already mapped the segment keep their mapping.
    pub fn remove(&self, name: &str) -> Result<bool, ShmError> {
        let path = self.segment_path(name)?;
        remove_file_if_exists(&path)
    }
}

fn default_directory() -> PathBuf {
    let dev_shm = Path::new("/dev/shm");
    if cfg!(target_os = "linux") && dev_shm.is_dir() {
        dev_shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<bool, ShmError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ShmError::io("unlink", e)),
    }
}

/// Validate a segment name.
///
/// Names are plain file names: non-empty, at most
/// [`MAX_SEGMENT_NAME_LENGTH`] bytes, no path separators, no NUL, and not
/// `.` or `..`.
pub fn validate_name(name: &str) -> Result<(), ShmError> {
    let invalid = name.is_empty()
        || name.len() > MAX_SEGMENT_NAME_LENGTH
        || name == "."
        || name == ".."
        || name.ends_with(".lock")
        || name.contains(['/', '\\', '\0']);

    if invalid {
        return Err(ShmError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validate_name_accepts_plain_names() {
        assert!(validate_name("kyrobus_listener_0").is_ok());
        assert!(validate_name("a.b-c").is_ok());
    }

    #[test]
    fn test_validate_name_rejects_paths_and_empty() {
        for bad in ["", ".", "..", "a/b", "nul\0", "owner.lock"] {
            assert!(
                matches!(validate_name(bad), Err(ShmError::InvalidName { .. })),
                "expected '{bad}' to be rejected"
            );
        }
        assert!(validate_name(&"x".repeat(MAX_SEGMENT_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_remove_missing_segment_is_false() {
        let dir = tempdir().unwrap();
        let cfg = ShmConfig::in_directory(dir.path());
        assert!(!cfg.exists("nothing").unwrap());
        assert!(!cfg.remove("nothing").unwrap());
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let cfg: ShmConfig =
            serde_json::from_str(r#"{ "directory": "/tmp/kyro", "open_mode": "open_existing" }"#).unwrap();
        assert_eq!(cfg.directory, PathBuf::from("/tmp/kyro"));
        assert_eq!(cfg.permissions, 0o600);
        assert_eq!(cfg.open_mode, OpenMode::OpenExisting);
        assert!(!cfg.open_mode.may_create());
    }
}
