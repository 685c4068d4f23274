//! Error types for box2 core.

use thiserror::Error;

/// Errors from identifier parsing and key derivation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The Diffie-Hellman exchange produced an all-zero shared secret.
    #[error("key agreement with {0} is not contributory")]
    NonContributory(String),
}

/// Errors surfaced by an [`EnvelopeCodec`](crate::EnvelopeCodec).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope needs between 1 and {max} recipient keys, got {count}")]
    InvalidRecipientCount { count: usize, max: usize },

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("encryption error: {0}")]
    Encryption(String),
}

/// Errors from [`GroupInfo`](crate::GroupInfo) transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("key is not one of the group's read keys")]
    UnknownKey,

    #[error("group is excluded")]
    Excluded,
}
