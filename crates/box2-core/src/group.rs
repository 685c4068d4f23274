//! Private group key state.
//!
//! A group is either **Active** (it has a write key and at least one read
//! key) or **Excluded** (no write key, read keys retained so that every
//! envelope sealed under a former write key stays openable).
//!
//! ```text
//!   add(key) ──► Active ──exclude──► Excluded
//!                │  ▲                  │
//!     add(key2)  │  │ pick(key2)       └─ add/pick fail with Excluded
//!                ▼  │
//!              Active
//! ```

use serde::{Deserialize, Serialize};

use crate::error::GroupError;
use crate::keys::{EncryptionKey, KeyScheme};
use crate::types::MsgId;

/// Key material announced for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeyInfo {
    /// The group's symmetric key bytes.
    pub key: [u8; 32],
    /// Provenance: the message that created the group.
    pub root: MsgId,
}

impl GroupKeyInfo {
    pub fn new(key: [u8; 32], root: MsgId) -> Self {
        Self { key, root }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Active,
    Excluded,
}

/// The read/write key state of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    write_key: Option<EncryptionKey>,
    read_keys: Vec<EncryptionKey>,
    root: MsgId,
    excluded: bool,
}

impl GroupInfo {
    /// A fresh Active group whose only key is both write and read key.
    pub fn new(info: GroupKeyInfo) -> Self {
        let key = EncryptionKey::new(info.key, KeyScheme::PrivateGroup);
        Self {
            write_key: Some(key.clone()),
            read_keys: vec![key],
            root: info.root,
            excluded: false,
        }
    }

    /// Append a read key. The write key is left untouched.
    ///
    /// Returns `false` when the key was already known.
    pub fn add_read_key(&mut self, key: [u8; 32]) -> Result<bool, GroupError> {
        if self.excluded {
            return Err(GroupError::Excluded);
        }
        if self.read_keys.iter().any(|k| k.as_bytes() == &key) {
            return Ok(false);
        }
        self.read_keys
            .push(EncryptionKey::new(key, KeyScheme::PrivateGroup));
        Ok(true)
    }

    /// Promote an existing read key to write key.
    pub fn pick_write_key(&mut self, key: &[u8; 32]) -> Result<(), GroupError> {
        if self.excluded {
            return Err(GroupError::Excluded);
        }
        let picked = self
            .read_keys
            .iter()
            .find(|k| k.as_bytes() == key)
            .cloned()
            .ok_or(GroupError::UnknownKey)?;
        self.write_key = Some(picked);
        Ok(())
    }

    /// Move to Excluded. Idempotent.
    pub fn exclude(&mut self) {
        self.excluded = true;
        self.write_key = None;
    }

    pub fn state(&self) -> GroupState {
        if self.excluded {
            GroupState::Excluded
        } else {
            GroupState::Active
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn write_key(&self) -> Option<&EncryptionKey> {
        self.write_key.as_ref()
    }

    /// Read keys in insertion order.
    pub fn read_keys(&self) -> &[EncryptionKey] {
        &self.read_keys
    }

    pub fn root(&self) -> &MsgId {
        &self.root
    }
}
