//! Proptest generators for property-based testing.

use proptest::prelude::*;

use box2_core::{FeedId, GroupId, Keypair, MsgId, RecipientId, MAX_SLOTS};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random feed id backed by a real keypair.
pub fn feed_id() -> impl Strategy<Value = FeedId> {
    keypair().prop_map(|kp| kp.id())
}

pub fn msg_id() -> impl Strategy<Value = MsgId> {
    any::<[u8; 32]>().prop_map(MsgId::from_bytes)
}

pub fn group_id() -> impl Strategy<Value = GroupId> {
    any::<[u8; 32]>().prop_map(GroupId::from_bytes)
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// The shape of a recipient list, to be filled in with real actors.
///
/// Slots are laid out group first, then the author, peers and drop boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipientPlan {
    pub group: bool,
    pub author_self: bool,
    pub peers: usize,
    pub drop_boxes: usize,
}

impl RecipientPlan {
    /// Number of envelope slots this plan fills.
    pub fn len(&self) -> usize {
        usize::from(self.group) + usize::from(self.author_self) + self.peers + self.drop_boxes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generate a recipient plan with 1 to 16 slots and at most one group.
pub fn recipient_plan() -> impl Strategy<Value = RecipientPlan> {
    (any::<bool>(), any::<bool>(), 0..=MAX_SLOTS, 0..=3usize)
        .prop_map(|(group, author_self, peers, drop_boxes)| RecipientPlan {
            group,
            author_self,
            peers,
            drop_boxes,
        })
        .prop_filter("plan must fill 1..=16 slots", |plan| {
            (1..=MAX_SLOTS).contains(&plan.len())
        })
}

/// Generate between `min` and `max` feed recipients.
pub fn feed_recipients(min: usize, max: usize) -> impl Strategy<Value = Vec<RecipientId>> {
    prop::collection::vec(feed_id().prop_map(RecipientId::Feed), min..=max)
}
