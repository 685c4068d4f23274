//! In-memory implementation of the KeyStorage trait.
//!
//! Same semantics as SQLite but keeps everything in memory with no
//! persistence.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{KeyRecord, KeyStorage, RecordKind};

/// In-memory storage implementation.
///
/// All data is lost when the storage is dropped. Thread-safe via RwLock.
pub struct MemoryStorage {
    inner: RwLock<MemoryStorageInner>,
}

struct MemoryStorageInner {
    /// Records in last-write order.
    records: Vec<(RecordKind, Vec<u8>, KeyRecord)>,
    closed: bool,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStorageInner {
                records: Vec::new(),
                closed: false,
            }),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

#[async_trait]
impl KeyStorage for MemoryStorage {
    async fn load_all(&self) -> Result<Vec<KeyRecord>> {
        let inner = self.inner.read().map_err(poisoned)?;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner.records.iter().map(|(_, _, r)| r.clone()).collect())
    }

    async fn put(&self, record: &KeyRecord) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.closed {
            return Err(StoreError::Closed);
        }

        let kind = record.kind();
        let id = record.id();
        let existing = inner
            .records
            .iter()
            .position(|(k, i, _)| *k == kind && *i == id);
        if let Some(pos) = existing {
            inner.records.remove(pos);
        }
        inner.records.push((kind, id, record.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box2_core::{DropBoxId, EncryptionKey, GroupId, GroupInfo, GroupKeyInfo, KeyScheme, MsgId};

    #[tokio::test]
    async fn test_put_moves_record_to_end() {
        let storage = MemoryStorage::new();
        let group = |key: u8| KeyRecord::Group {
            id: GroupId::from_bytes([1; 32]),
            info: GroupInfo::new(GroupKeyInfo::new([key; 32], MsgId::from_bytes([0; 32]))),
        };
        let drop_box = KeyRecord::DropBox {
            id: DropBoxId::from_bytes([2; 32]),
            secret: [3; 32],
        };

        storage.put(&group(1)).await.unwrap();
        storage.put(&drop_box).await.unwrap();
        storage.put(&group(9)).await.unwrap();

        let records = storage.load_all().await.unwrap();
        assert_eq!(records, vec![drop_box, group(9)]);
    }

    #[tokio::test]
    async fn test_self_keys_accumulate() {
        let storage = MemoryStorage::new();
        for byte in [1u8, 2] {
            let key = EncryptionKey::new([byte; 32], KeyScheme::SelfDm);
            storage.put(&KeyRecord::SelfKey { key }).await.unwrap();
        }
        assert_eq!(storage.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_calls() {
        let storage = MemoryStorage::new();
        storage.close().await.unwrap();
        assert!(matches!(storage.load_all().await, Err(StoreError::Closed)));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn one_record_per_key_in_last_write_order(
                puts in proptest::collection::vec((0u8..4, any::<u8>()), 1..32),
            ) {
                let storage = MemoryStorage::new();
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

                let records = rt.block_on(async {
                    for (id, secret) in &puts {
                        let record = KeyRecord::DropBox {
                            id: DropBoxId::from_bytes([*id; 32]),
                            secret: [*secret; 32],
                        };
                        storage.put(&record).await.unwrap();
                    }
                    storage.load_all().await.unwrap()
                });

                let mut expected: Vec<(u8, u8)> = Vec::new();
                for (id, secret) in &puts {
                    expected.retain(|(seen, _)| seen != id);
                    expected.push((*id, *secret));
                }
                let expected: Vec<_> = expected
                    .into_iter()
                    .map(|(id, secret)| KeyRecord::DropBox {
                        id: DropBoxId::from_bytes([id; 32]),
                        secret: [secret; 32],
                    })
                    .collect();
                prop_assert_eq!(records, expected);
            }
        }
    }
}
