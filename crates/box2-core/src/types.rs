//! Strong identifier types.
//!
//! Every identifier is a 32-byte newtype with a textual form:
//!
//! | type | text form |
//! |---|---|
//! | [`FeedId`] | `@<base64>.ed25519` |
//! | [`MsgId`] | `%<base64>.sha256` |
//! | [`GroupId`] | `%<base64>.cloaked` |
//! | [`DropBoxId`] | `ssb:identity/po-box/<base64url>` |

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 32] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

id_type!(
    /// An Ed25519 public key identifying a feed (a main identity or a subfeed).
    FeedId,
    "Feed"
);

id_type!(
    /// Content hash of a feed message; used as the `previous` context of an envelope.
    MsgId,
    "Msg"
);

id_type!(
    /// The cloaked identifier of a private group.
    GroupId,
    "Group"
);

id_type!(
    /// The public X25519 half of a drop box. Anyone knowing it can encrypt to it.
    DropBoxId,
    "DropBox"
);

const FEED_SUFFIX: &str = ".ed25519";
const MSG_SUFFIX: &str = ".sha256";
const GROUP_SUFFIX: &str = ".cloaked";
const DROP_BOX_PREFIX: &str = "ssb:identity/po-box/";

fn decode_sigil(s: &str, sigil: char, suffix: &str) -> Option<[u8; 32]> {
    let body = s.strip_prefix(sigil)?.strip_suffix(suffix)?;
    let bytes = STANDARD.decode(body).ok()?;
    bytes.try_into().ok()
}

fn invalid(kind: &str, s: &str) -> CoreError {
    CoreError::InvalidIdentifier(format!("not a {kind}: {s}"))
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}{}", STANDARD.encode(self.0), FEED_SUFFIX)
    }
}

impl FromStr for FeedId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sigil(s, '@', FEED_SUFFIX)
            .map(Self)
            .ok_or_else(|| invalid("feed id", s))
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}", STANDARD.encode(self.0), MSG_SUFFIX)
    }
}

impl FromStr for MsgId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sigil(s, '%', MSG_SUFFIX)
            .map(Self)
            .ok_or_else(|| invalid("message id", s))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}", STANDARD.encode(self.0), GROUP_SUFFIX)
    }
}

impl FromStr for GroupId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sigil(s, '%', GROUP_SUFFIX)
            .map(Self)
            .ok_or_else(|| invalid("group id", s))
    }
}

impl fmt::Display for DropBoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DROP_BOX_PREFIX, URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl FromStr for DropBoxId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(DROP_BOX_PREFIX)
            .and_then(|body| URL_SAFE_NO_PAD.decode(body).ok())
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(Self)
            .ok_or_else(|| invalid("drop box id", s))
    }
}
