//! KeyStorage trait: the abstract interface for key record persistence.
//!
//! This trait allows the key ring to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use box2_core::{DropBoxId, EncryptionKey, FeedId, GroupId, GroupInfo};

use crate::error::Result;

/// Discriminates record families; part of the storage primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    SelfKey,
    Group,
    DropBox,
    Signing,
    Triangle,
}

impl RecordKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordKind::SelfKey => "self",
            RecordKind::Group => "group",
            RecordKind::DropBox => "drop_box",
            RecordKind::Signing => "signing",
            RecordKind::Triangle => "triangle",
        }
    }
}

/// One persisted unit of key material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyRecord {
    /// One of the actor's own symmetric keys. The last one stored is current.
    SelfKey { key: EncryptionKey },
    /// A private group and all its keys.
    Group { id: GroupId, info: GroupInfo },
    /// A drop box this actor can read.
    DropBox { id: DropBoxId, secret: [u8; 32] },
    /// A local signing identity (a subfeed in the actor's tree).
    Signing {
        id: FeedId,
        seed: [u8; 32],
        label: Option<String>,
    },
    /// Triangulation entry: under `root`, the leaf mirroring `mirror` is `leaf`.
    Triangle {
        root: FeedId,
        mirror: FeedId,
        leaf: FeedId,
    },
}

impl KeyRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            KeyRecord::SelfKey { .. } => RecordKind::SelfKey,
            KeyRecord::Group { .. } => RecordKind::Group,
            KeyRecord::DropBox { .. } => RecordKind::DropBox,
            KeyRecord::Signing { .. } => RecordKind::Signing,
            KeyRecord::Triangle { .. } => RecordKind::Triangle,
        }
    }

    /// Identity of the record within its kind. Upserts replace on `(kind, id)`.
    pub fn id(&self) -> Vec<u8> {
        match self {
            KeyRecord::SelfKey { key } => key.as_bytes().to_vec(),
            KeyRecord::Group { id, .. } => id.as_bytes().to_vec(),
            KeyRecord::DropBox { id, .. } => id.as_bytes().to_vec(),
            KeyRecord::Signing { id, .. } => id.as_bytes().to_vec(),
            KeyRecord::Triangle { root, mirror, .. } => {
                let mut id = Vec::with_capacity(64);
                id.extend_from_slice(root.as_bytes());
                id.extend_from_slice(mirror.as_bytes());
                id
            }
        }
    }

    /// Encode as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| crate::StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| crate::StoreError::Serialization(e.to_string()))
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // the id of a self key is the key itself
            KeyRecord::SelfKey { .. } => write!(f, "KeyRecord(self, [REDACTED])"),
            _ => write!(f, "KeyRecord({}, {})", self.kind().as_str(), hex::encode(self.id())),
        }
    }
}

/// The KeyStorage trait: async interface for key record persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
#[async_trait]
pub trait KeyStorage: Send + Sync {
    /// Load every record in last-write order.
    async fn load_all(&self) -> Result<Vec<KeyRecord>>;

    /// Insert or replace a record.
    async fn put(&self, record: &KeyRecord) -> Result<()>;

    /// Release the backend. Later calls fail with [`StoreError::Closed`](crate::StoreError::Closed).
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use box2_core::{GroupKeyInfo, KeyScheme, MsgId};

    #[test]
    fn test_cbor_roundtrip_group() {
        let info = GroupInfo::new(GroupKeyInfo::new([5; 32], MsgId::from_bytes([6; 32])));
        let record = KeyRecord::Group {
            id: GroupId::from_bytes([7; 32]),
            info,
        };
        let decoded = KeyRecord::from_cbor(&record.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_triangle_id_depends_on_root_and_mirror() {
        let a = KeyRecord::Triangle {
            root: FeedId::from_bytes([1; 32]),
            mirror: FeedId::from_bytes([2; 32]),
            leaf: FeedId::from_bytes([3; 32]),
        };
        let b = KeyRecord::Triangle {
            root: FeedId::from_bytes([1; 32]),
            mirror: FeedId::from_bytes([2; 32]),
            leaf: FeedId::from_bytes([4; 32]),
        };
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 64);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let record = KeyRecord::SelfKey {
            key: EncryptionKey::new([0xab; 32], KeyScheme::SelfDm),
        };
        let debug = format!("{:?}", record);
        assert!(debug.starts_with("KeyRecord(self"));
        assert!(!debug.contains("abab"));
    }

    #[test]
    fn test_garbage_cbor_rejected() {
        assert!(KeyRecord::from_cbor(&[0xff, 0x00, 0x13]).is_err());
    }
}
