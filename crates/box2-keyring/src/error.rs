//! Error types for the key ring.

use thiserror::Error;

use box2_core::GroupId;
use box2_store::StoreError;

/// Errors that can occur during key ring operations.
#[derive(Debug, Error)]
pub enum KeyRingError {
    /// A synchronous operation was called before storage finished loading.
    #[error("key ring is not ready")]
    NotReady,

    /// Loading key storage failed; the key ring is unusable.
    #[error("key ring failed to load: {0}")]
    LoadFailed(String),

    #[error("key ring is closed")]
    Closed,

    /// `pick_group_write_key` named a key that is not among the read keys.
    #[error("unknown key for group")]
    UnknownKey,

    #[error("unknown group: {0}")]
    UnknownGroup(GroupId),

    #[error("group is excluded: {0}")]
    GroupExcluded(GroupId),

    /// No DH-capable counterpart or mirrored leaf could be found.
    #[error("triangulation failed: {0}")]
    TriangulationFailed(String),

    #[error("invalid drop box: {0}")]
    InvalidDropBox(String),

    #[error("no self key available")]
    MissingSelfKey,

    #[error("key ring lock poisoned: {0}")]
    Poisoned(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Result type for key ring operations.
pub type Result<T> = std::result::Result<T, KeyRingError>;
