//! Recipient keys and key schemes.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// The four key schemes an envelope slot can be sealed under.
///
/// The string tags are shared with the wider private-group key-scheme
/// registry and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyScheme {
    /// The author's own symmetric key.
    SelfDm,
    /// Diffie-Hellman secret between two feeds.
    PairwiseDm,
    /// Symmetric key of a private group.
    PrivateGroup,
    /// One-way key derived towards a drop box.
    DropBox,
}

impl KeyScheme {
    /// Stable registry tag for this scheme.
    pub const fn as_str(&self) -> &'static str {
        match self {
            KeyScheme::SelfDm => "envelope-symmetric-key-for-self",
            KeyScheme::PairwiseDm => "envelope-id-based-dm-converted-ed25519",
            KeyScheme::PrivateGroup => "envelope-large-symmetric-group",
            KeyScheme::DropBox => "envelope-id-based-pobox",
        }
    }

    /// Parse a registry tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        [
            KeyScheme::SelfDm,
            KeyScheme::PairwiseDm,
            KeyScheme::PrivateGroup,
            KeyScheme::DropBox,
        ]
        .into_iter()
        .find(|scheme| scheme.as_str() == tag)
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 256-bit recipient key together with the scheme it belongs to.
///
/// Immutable once constructed. Equality compares both bytes and scheme;
/// use [`EncryptionKey::same_bytes`] for byte-only comparison.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    bytes: [u8; 32],
    scheme: KeyScheme,
}

impl EncryptionKey {
    /// Create a key from raw bytes.
    pub const fn new(bytes: [u8; 32], scheme: KeyScheme) -> Self {
        Self { bytes, scheme }
    }

    /// Generate a random key for the given scheme.
    pub fn generate(scheme: KeyScheme) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes, scheme }
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub const fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    /// Whether two keys carry the same secret, regardless of scheme.
    pub fn same_bytes(&self, other: &EncryptionKey) -> bool {
        self.bytes == other.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({:?}, [REDACTED])", self.scheme)
    }
}

/// The ephemeral per-message symmetric key.
///
/// Generated fresh for every envelope and never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageKey([u8; 32]);

impl MessageKey {
    /// Generate a new random message key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_tags_roundtrip() {
        for scheme in [
            KeyScheme::SelfDm,
            KeyScheme::PairwiseDm,
            KeyScheme::PrivateGroup,
            KeyScheme::DropBox,
        ] {
            assert_eq!(KeyScheme::from_tag(scheme.as_str()), Some(scheme));
        }
        assert_eq!(KeyScheme::from_tag("envelope-unknown"), None);
    }

    #[test]
    fn test_same_bytes_ignores_scheme() {
        let a = EncryptionKey::new([1; 32], KeyScheme::PrivateGroup);
        let b = EncryptionKey::new([1; 32], KeyScheme::SelfDm);
        assert!(a.same_bytes(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = EncryptionKey::new([0x5a; 32], KeyScheme::DropBox);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("5a"));
        assert!(debug.contains("REDACTED"));
    }
}
