//! Error types for forest monitoring.

use thiserror::Error;

use box2_keyring::KeyRingError;

#[derive(Debug, Error)]
pub enum ForestError {
    /// The forest source could not provide branches.
    #[error("forest source error: {0}")]
    Source(anyhow::Error),

    #[error("key ring error: {0}")]
    KeyRing(#[from] KeyRingError),

    #[error("monitor task failed: {0}")]
    Task(String),
}

/// Result type for forest operations.
pub type Result<T> = std::result::Result<T, ForestError>;
