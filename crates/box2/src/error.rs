//! Error types for the box2 engine.

use thiserror::Error;

use box2_core::CodecError;
use box2_forest::ForestError;
use box2_keyring::KeyRingError;
use box2_store::StoreError;

/// Errors that can occur during box2 operations.
///
/// Failing to decrypt is not an error: see [`Decrypted::Undecryptable`](crate::Decrypted).
#[derive(Debug, Error)]
pub enum Box2Error {
    /// The recipient list cannot be sealed into one envelope.
    #[error("{reason} (recipients: {count})")]
    InvalidRecipients { reason: String, count: usize },

    /// The identifier matches no known recipient kind.
    #[error("unsupported recipient: {0}")]
    UnsupportedRecipient(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key ring error: {0}")]
    KeyRing(#[from] KeyRingError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("forest error: {0}")]
    Forest(#[from] ForestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Box2Error {
    pub(crate) fn invalid_recipients(reason: &str, count: usize) -> Self {
        Box2Error::InvalidRecipients {
            reason: reason.to_string(),
            count,
        }
    }

    /// Whether the key ring had not finished loading.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Box2Error::KeyRing(KeyRingError::NotReady))
    }

    /// Whether a DM key could not be established.
    pub fn is_triangulation_failed(&self) -> bool {
        matches!(
            self,
            Box2Error::KeyRing(KeyRingError::TriangulationFailed(_))
        )
    }
}

impl From<CodecError> for Box2Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::InvalidRecipientCount { count, .. } => {
                Box2Error::invalid_recipients("envelope recipient count out of range", count)
            }
            CodecError::MalformedCiphertext(reason) => Box2Error::MalformedCiphertext(reason),
            CodecError::Encryption(reason) => Box2Error::Encryption(reason),
        }
    }
}

/// Result type for box2 operations.
pub type Result<T> = std::result::Result<T, Box2Error>;
