//! Binary tagging of identifiers.
//!
//! The envelope binds the author and the previous message into its key
//! derivations so a ciphertext cannot be replayed under another context.
//! Both are encoded as `type byte || format byte || data`.

use crate::types::{FeedId, MsgId};

const TYPE_FEED: u8 = 0x00;
const TYPE_MSG: u8 = 0x01;
const TYPE_GENERIC: u8 = 0x06;

const FORMAT_ED25519: u8 = 0x00;
const FORMAT_SHA256: u8 = 0x00;
const FORMAT_NIL: u8 = 0x02;

/// Types with a canonical tagged byte encoding.
pub trait Tag {
    fn tag(&self) -> Vec<u8>;
}

fn tagged(type_byte: u8, format_byte: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + data.len());
    out.push(type_byte);
    out.push(format_byte);
    out.extend_from_slice(data);
    out
}

impl Tag for FeedId {
    fn tag(&self) -> Vec<u8> {
        tagged(TYPE_FEED, FORMAT_ED25519, self.as_bytes())
    }
}

impl Tag for MsgId {
    fn tag(&self) -> Vec<u8> {
        tagged(TYPE_MSG, FORMAT_SHA256, self.as_bytes())
    }
}

/// The first message of a feed has no previous message; it tags as nil.
impl Tag for Option<MsgId> {
    fn tag(&self) -> Vec<u8> {
        match self {
            Some(id) => id.tag(),
            None => tagged(TYPE_GENERIC, FORMAT_NIL, &[]),
        }
    }
}
