//! Error types for kyrobus.
//!
//! All errors in kyrobus are strongly typed using thiserror.
//! Attaching to a full listener or attaching the same event twice are routine
//! conditions and surface as values the caller is expected to match on.

use std::io;

use thiserror::Error;

/// Errors reported by the listener when attaching events.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Listener is full: all {capacity} slots are occupied")]
    ListenerFull {
        capacity: usize,
    },

    #[error("Event is already attached in slot {slot}")]
    EventAlreadyAttached {
        slot: usize,
    },

    #[error("Listener capacity {requested} is out of range [1, {max}]")]
    InvalidCapacity {
        requested: usize,
        max: usize,
    },

    #[error("Failed to spawn collector thread: {message}")]
    CollectorSpawn {
        message: String,
    },
}

/// Errors from creating or opening a shared memory segment.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("Invalid segment name '{name}'")]
    InvalidName {
        name: String,
    },

    #[error("Segment '{name}' already exists")]
    AlreadyExists {
        name: String,
    },

    #[error("Segment '{name}' does not exist")]
    DoesNotExist {
        name: String,
    },

    #[error("Segment '{name}' has size {actual}, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Segment '{name}' has an incompatible layout")]
    IncompatibleLayout {
        name: String,
    },

    #[error("I/O error during {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ShmError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        Self::Io { op, source }
    }
}

/// Errors from the service registry and discovery layer.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Identifier '{value}' exceeds maximum length of {max}")]
    IdStringTooLong {
        value: String,
        max: usize,
    },

    #[error("Identifier cannot be empty")]
    EmptyIdString,

    #[error("Service registry is full ({capacity} entries)")]
    RegistryFull {
        capacity: usize,
    },
}

/// Top-level error type for kyrobus.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Shared memory error: {0}")]
    Shm(#[from] ShmError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

impl BusError {
    /// Returns true if this is a listener error.
    #[must_use]
    pub const fn is_listener(&self) -> bool {
        matches!(self, Self::Listener(_))
    }

    /// Returns true if this is a shared memory error.
    #[must_use]
    pub const fn is_shm(&self) -> bool {
        matches!(self, Self::Shm(_))
    }

    /// Returns true if this is a discovery error.
    #[must_use]
    pub const fn is_discovery(&self) -> bool {
        matches!(self, Self::Discovery(_))
    }

    /// Returns true if the caller can retry once the condition clears.
    ///
    /// A full listener frees up on detach; a segment that does not exist yet
    /// may be created by its owner later.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Listener(e) => matches!(e, ListenerError::ListenerFull { .. }),
            Self::Shm(e) => matches!(e, ShmError::DoesNotExist { .. }),
            Self::Discovery(e) => matches!(e, DiscoveryError::RegistryFull { .. }),
        }
    }
}

/// Result type alias for kyrobus operations.
pub type BusResult<T> = Result<T, BusError>;
