//! Recipient resolution.
//!
//! Turns a list of [`RecipientId`]s into the per-slot [`EncryptionKey`]s of
//! an envelope. Slot order follows recipient order.

use std::sync::Arc;

use box2_core::{
    derive_drop_box_send_key, DropBoxId, EncryptionKey, FeedId, FeedIdentifier, GroupId,
    GroupMembership, Keypair, RecipientId, MAX_GROUP_RECIPIENTS, MAX_SLOTS,
};
use box2_keyring::{KeyRing, KeyRingError};

use crate::error::{Box2Error, Result};

/// Resolves recipients against the key ring.
pub struct RecipientResolver {
    keyring: Arc<KeyRing>,
    feeds: Arc<dyn FeedIdentifier>,
    legacy_mode: bool,
}

impl RecipientResolver {
    pub fn new(keyring: Arc<KeyRing>, feeds: Arc<dyn FeedIdentifier>, legacy_mode: bool) -> Self {
        Self {
            keyring,
            feeds,
            legacy_mode,
        }
    }

    /// Map a textual identifier to a recipient.
    ///
    /// Groups and drop boxes are looked up in the key ring on every call;
    /// ones it does not hold are unsupported.
    pub fn classify(&self, s: &str) -> Result<RecipientId> {
        if let Some(feed) = self.feeds.parse_feed(s) {
            return Ok(RecipientId::Feed(feed));
        }
        if let Ok(group) = s.parse::<GroupId>() {
            if self.keyring.is_group(&group)? {
                return Ok(RecipientId::Group(group));
            }
        }
        if let Ok(drop_box) = s.parse::<DropBoxId>() {
            if self.keyring.is_drop_box(&drop_box)? {
                return Ok(RecipientId::DropBox(drop_box));
            }
        }
        Err(Box2Error::UnsupportedRecipient(s.to_string()))
    }

    /// Check the recipient list, then resolve one key per recipient.
    ///
    /// The list is validated as a whole before any key is derived.
    pub fn resolve(
        &self,
        recipients: &[RecipientId],
        author: &Keypair,
    ) -> Result<Vec<EncryptionKey>> {
        validate(recipients)?;

        recipients
            .iter()
            .map(|recipient| self.resolve_one(recipient, author))
            .collect()
    }

    fn resolve_one(&self, recipient: &RecipientId, author: &Keypair) -> Result<EncryptionKey> {
        match recipient {
            RecipientId::AuthorSelf => Ok(self.keyring.self_key()?),
            RecipientId::RawGroupKey(key) => Ok(key.clone()),
            RecipientId::Feed(feed) => self.feed_key(feed, author),
            RecipientId::Group(group) => match self.keyring.group_write_key(group) {
                Err(KeyRingError::UnknownGroup(_)) => {
                    Err(Box2Error::UnsupportedRecipient(group.to_string()))
                }
                other => Ok(other?),
            },
            RecipientId::DropBox(drop_box) => {
                if !self.keyring.is_drop_box(drop_box)? {
                    return Err(Box2Error::UnsupportedRecipient(drop_box.to_string()));
                }
                derive_drop_box_send_key(author, drop_box)
                    .map_err(|e| Box2Error::UnsupportedRecipient(format!("{}: {}", drop_box, e)))
            }
        }
    }

    fn feed_key(&self, feed: &FeedId, author: &Keypair) -> Result<EncryptionKey> {
        if *feed == author.id() || self.keyring.is_local_identity(feed)? {
            return Ok(self.keyring.self_key()?);
        }

        if self.legacy_mode {
            return Ok(self.keyring.dm_key(author, feed)?);
        }

        // `feed` is a peer's root; find their leaf mirroring the author
        let their_leaf = self.keyring.triangulate(feed, &author.id())?.ok_or_else(|| {
            KeyRingError::TriangulationFailed(format!(
                "no leaf under {} mirrors {}",
                feed,
                author.id()
            ))
        })?;
        Ok(self.keyring.dm_key(author, &their_leaf)?)
    }
}

fn validate(recipients: &[RecipientId]) -> Result<()> {
    let count = recipients.len();
    if count == 0 {
        return Err(Box2Error::invalid_recipients("no keys found for recipients", 0));
    }
    if count > MAX_SLOTS {
        return Err(Box2Error::invalid_recipients(
            "maximum 16 slots exceeded",
            count,
        ));
    }

    let groups = recipients.iter().filter(|r| r.is_group()).count();
    if groups > MAX_GROUP_RECIPIENTS {
        return Err(Box2Error::invalid_recipients(
            "only one group recipient supported",
            groups,
        ));
    }
    if recipients.iter().skip(1).any(RecipientId::is_group) {
        return Err(Box2Error::invalid_recipients(
            "group recipient must be in the first slot",
            count,
        ));
    }

    Ok(())
}
