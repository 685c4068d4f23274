//! # box2 core
//!
//! Pure primitives for multi-recipient envelope encryption on append-only
//! feeds: identifiers, key schemes, key derivations and the envelope codec.
//!
//! This crate contains no I/O and no storage. Everything here is a pure
//! function of its inputs, except for the random generation of fresh keys.
//!
//! ## Key Types
//!
//! - [`FeedId`], [`MsgId`], [`GroupId`], [`DropBoxId`] - 32-byte identifiers
//! - [`RecipientId`] - what a caller can encrypt to
//! - [`EncryptionKey`] - a recipient key tagged with its [`KeyScheme`]
//! - [`GroupInfo`] - the read/write key state of one private group
//! - [`EnvelopeCodec`] - seal/trial-open interface, implemented by [`SlotCodec`]
//!
//! ## Envelopes
//!
//! An envelope carries no recipient metadata. A reader finds out whether a
//! message is for them by trial decryption: every candidate key is tested
//! against the first `max_attempts` slots of the envelope.

pub mod codec;
pub mod crypto;
pub mod error;
pub mod group;
pub mod keys;
pub mod recipient;
pub mod tag;
pub mod types;

pub use codec::{EnvelopeCodec, SlotCodec, MAX_SLOTS};
pub use crypto::{
    derive_dm_key, derive_drop_box_receive_key, derive_drop_box_send_key, DropBoxSecret, Keypair,
};
pub use error::{CodecError, CoreError, GroupError};
pub use group::{GroupInfo, GroupKeyInfo, GroupState};
pub use keys::{EncryptionKey, KeyScheme, MessageKey};
pub use recipient::{
    FeedIdentifier, GroupMembership, RecipientId, SigilFeedIdentifier, MAX_GROUP_RECIPIENTS,
};
pub use tag::Tag;
pub use types::{DropBoxId, FeedId, GroupId, MsgId};
