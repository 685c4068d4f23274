//! Recipient identifiers and the capabilities used to classify them.

use crate::keys::{EncryptionKey, KeyScheme};
use crate::types::{DropBoxId, FeedId, GroupId};

/// At most one private-group key may be sealed into an envelope.
pub const MAX_GROUP_RECIPIENTS: usize = 1;

/// Anything an envelope can be addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientId {
    /// The author of the message.
    AuthorSelf,
    /// A feed: the author's own feed, or a DM counterpart.
    Feed(FeedId),
    /// A private group known to the local key ring.
    Group(GroupId),
    /// A drop box, addressed by its public id.
    DropBox(DropBoxId),
    /// A group key handed over directly, bypassing the key ring.
    RawGroupKey(EncryptionKey),
}

impl RecipientId {
    /// Whether this recipient resolves to a private-group key.
    pub fn is_group(&self) -> bool {
        match self {
            RecipientId::Group(_) => true,
            RecipientId::RawGroupKey(key) => key.scheme() == KeyScheme::PrivateGroup,
            _ => false,
        }
    }
}

impl From<FeedId> for RecipientId {
    fn from(id: FeedId) -> Self {
        RecipientId::Feed(id)
    }
}

impl From<GroupId> for RecipientId {
    fn from(id: GroupId) -> Self {
        RecipientId::Group(id)
    }
}

impl From<DropBoxId> for RecipientId {
    fn from(id: DropBoxId) -> Self {
        RecipientId::DropBox(id)
    }
}

/// Recognizes textual feed identifiers.
pub trait FeedIdentifier: Send + Sync {
    /// Parse `s` as a feed id, or `None` if it is not one.
    fn parse_feed(&self, s: &str) -> Option<FeedId>;
}

/// Answers which groups and drop boxes are held locally; implemented by
/// the key ring.
pub trait GroupMembership {
    type Error;

    fn is_group(&self, id: &GroupId) -> Result<bool, Self::Error>;

    fn is_drop_box(&self, id: &DropBoxId) -> Result<bool, Self::Error>;
}

/// Accepts feed ids in their `@<base64>.ed25519` sigil form.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigilFeedIdentifier;

impl FeedIdentifier for SigilFeedIdentifier {
    fn parse_feed(&self, s: &str) -> Option<FeedId> {
        s.parse().ok()
    }
}
