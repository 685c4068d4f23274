//! The envelope codec.
//!
//! [`EnvelopeCodec`] is the seam between key management and the symmetric
//! cipher. [`SlotCodec`] is the implementation used by this workspace.
//!
//! ## Envelope layout
//!
//! ```text
//! header_box (32) || slot_0 (32) || ... || slot_{n-1} (32) || body_box
//! ```
//!
//! - `read_key  = KDF(msg_key, author, previous)`
//! - `header_box = AEAD(KDF(read_key, "header"), offset_le16 || 14 zero bytes)`
//! - `slot_i    = msg_key XOR KDF(recipient_key_i, scheme_i, author, previous)`
//! - `body_box  = AEAD(KDF(read_key, "body"), plaintext)`
//!
//! Each AEAD key is unique per message, so both boxes use the zero nonce.
//! The header box authenticates a guessed message key: trial decryption
//! XORs a slot with a candidate slot key and checks whether the header opens.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::crypto::derive_key;
use crate::error::CodecError;
use crate::keys::{EncryptionKey, MessageKey};

/// Maximum number of recipient slots in one envelope.
pub const MAX_SLOTS: usize = 16;

const SLOT_LEN: usize = 32;
const AEAD_TAG_LEN: usize = 16;
const HEADER_PLAIN_LEN: usize = 16;
const HEADER_LEN: usize = HEADER_PLAIN_LEN + AEAD_TAG_LEN;
const MIN_ENVELOPE_LEN: usize = HEADER_LEN + SLOT_LEN + AEAD_TAG_LEN;

const READ_KEY_CONTEXT: &str = "box2 2021-06 read key";
const HEADER_KEY_CONTEXT: &str = "box2 2021-06 header key";
const BODY_KEY_CONTEXT: &str = "box2 2021-06 body key";
const SLOT_KEY_CONTEXT: &str = "box2 2021-06 slot key";

/// Seal and trial-open multi-recipient envelopes.
///
/// `author` and `previous` are the tagged encodings of the author feed and
/// the previous message (see [`Tag`](crate::Tag)); they are bound into every
/// derivation.
pub trait EnvelopeCodec: Send + Sync {
    /// Seal `plaintext` under `msg_key`, with one slot per recipient key in order.
    fn seal(
        &self,
        plaintext: &[u8],
        author: &[u8],
        previous: &[u8],
        msg_key: &MessageKey,
        recipients: &[EncryptionKey],
    ) -> Result<Vec<u8>, CodecError>;

    /// Recover the message key by testing each candidate against the first
    /// `max_attempts` slots.
    fn try_open(
        &self,
        ciphertext: &[u8],
        author: &[u8],
        previous: &[u8],
        candidates: &[EncryptionKey],
        max_attempts: usize,
    ) -> Result<Option<MessageKey>, CodecError>;

    /// Decrypt the body given a recovered message key.
    fn open_body(
        &self,
        ciphertext: &[u8],
        author: &[u8],
        previous: &[u8],
        msg_key: &MessageKey,
    ) -> Result<Option<Vec<u8>>, CodecError>;
}

/// Slot-based envelope codec (ChaCha20-Poly1305 + Blake3 KDF).
#[derive(Debug, Default, Clone, Copy)]
pub struct SlotCodec;

impl SlotCodec {
    pub fn new() -> Self {
        Self
    }
}

fn aead(key: &[u8; 32]) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key))
}

fn zero_nonce() -> &'static Nonce {
    Nonce::from_slice(&[0u8; 12])
}

fn read_key(msg_key: &[u8; 32], author: &[u8], previous: &[u8]) -> [u8; 32] {
    derive_key(READ_KEY_CONTEXT, &[msg_key, author, previous])
}

fn slot_key(key: &EncryptionKey, author: &[u8], previous: &[u8]) -> [u8; 32] {
    derive_key(
        SLOT_KEY_CONTEXT,
        &[
            key.as_bytes(),
            key.scheme().as_str().as_bytes(),
            author,
            previous,
        ],
    )
}

fn xor(a: &[u8], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a[i] ^ b[i];
    }
    out
}

/// Open the header box, returning the body offset.
fn open_header(ciphertext: &[u8], read_key: &[u8; 32]) -> Option<usize> {
    let header_key = derive_key(HEADER_KEY_CONTEXT, &[read_key]);
    let plain = aead(&header_key)
        .decrypt(zero_nonce(), &ciphertext[..HEADER_LEN])
        .ok()?;
    Some(u16::from_le_bytes([plain[0], plain[1]]) as usize)
}

fn check_len(ciphertext: &[u8]) -> Result<(), CodecError> {
    if ciphertext.len() < MIN_ENVELOPE_LEN {
        return Err(CodecError::MalformedCiphertext(format!(
            "envelope of {} bytes is shorter than the minimum {}",
            ciphertext.len(),
            MIN_ENVELOPE_LEN
        )));
    }
    Ok(())
}

impl EnvelopeCodec for SlotCodec {
    fn seal(
        &self,
        plaintext: &[u8],
        author: &[u8],
        previous: &[u8],
        msg_key: &MessageKey,
        recipients: &[EncryptionKey],
    ) -> Result<Vec<u8>, CodecError> {
        if recipients.is_empty() || recipients.len() > MAX_SLOTS {
            return Err(CodecError::InvalidRecipientCount {
                count: recipients.len(),
                max: MAX_SLOTS,
            });
        }

        let read = read_key(msg_key.as_bytes(), author, previous);
        let offset = HEADER_LEN + recipients.len() * SLOT_LEN;

        let mut header_plain = [0u8; HEADER_PLAIN_LEN];
        header_plain[..2].copy_from_slice(&(offset as u16).to_le_bytes());
        let header_key = derive_key(HEADER_KEY_CONTEXT, &[&read]);
        let header_box = aead(&header_key)
            .encrypt(zero_nonce(), header_plain.as_slice())
            .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let body_key = derive_key(BODY_KEY_CONTEXT, &[&read]);
        let body_box = aead(&body_key)
            .encrypt(zero_nonce(), plaintext)
            .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(offset + body_box.len());
        out.extend_from_slice(&header_box);
        for key in recipients {
            let slot = xor(msg_key.as_bytes(), &slot_key(key, author, previous));
            out.extend_from_slice(&slot);
        }
        out.extend_from_slice(&body_box);
        Ok(out)
    }

    fn try_open(
        &self,
        ciphertext: &[u8],
        author: &[u8],
        previous: &[u8],
        candidates: &[EncryptionKey],
        max_attempts: usize,
    ) -> Result<Option<MessageKey>, CodecError> {
        check_len(ciphertext)?;

        let available = (ciphertext.len() - HEADER_LEN - AEAD_TAG_LEN) / SLOT_LEN;
        let attempts = max_attempts.min(available).min(MAX_SLOTS);

        for candidate in candidates {
            let key = slot_key(candidate, author, previous);
            for i in 0..attempts {
                let start = HEADER_LEN + i * SLOT_LEN;
                let guess = xor(&ciphertext[start..start + SLOT_LEN], &key);
                let read = read_key(&guess, author, previous);
                if open_header(ciphertext, &read).is_some() {
                    return Ok(Some(MessageKey::from_bytes(guess)));
                }
            }
        }

        Ok(None)
    }

    fn open_body(
        &self,
        ciphertext: &[u8],
        author: &[u8],
        previous: &[u8],
        msg_key: &MessageKey,
    ) -> Result<Option<Vec<u8>>, CodecError> {
        check_len(ciphertext)?;

        let read = read_key(msg_key.as_bytes(), author, previous);
        let Some(offset) = open_header(ciphertext, &read) else {
            return Ok(None);
        };

        if offset < HEADER_LEN + SLOT_LEN || offset + AEAD_TAG_LEN > ciphertext.len() {
            return Err(CodecError::MalformedCiphertext(format!(
                "body offset {} outside envelope of {} bytes",
                offset,
                ciphertext.len()
            )));
        }

        let body_key = derive_key(BODY_KEY_CONTEXT, &[&read]);
        Ok(aead(&body_key)
            .decrypt(zero_nonce(), &ciphertext[offset..])
            .ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyScheme;

    const AUTHOR: &[u8] = b"\x00\x00author-tag";
    const PREVIOUS: &[u8] = b"\x06\x02";

    fn open(
        codec: &SlotCodec,
        ct: &[u8],
        keys: &[EncryptionKey],
        max_attempts: usize,
    ) -> Option<Vec<u8>> {
        let msg_key = codec
            .try_open(ct, AUTHOR, PREVIOUS, keys, max_attempts)
            .unwrap()?;
        codec.open_body(ct, AUTHOR, PREVIOUS, &msg_key).unwrap()
    }

    #[test]
    fn test_every_slot_opens() {
        let codec = SlotCodec::new();
        let keys: Vec<_> = (0..MAX_SLOTS)
            .map(|_| EncryptionKey::generate(KeyScheme::PairwiseDm))
            .collect();

        let ct = codec
            .seal(b"hello", AUTHOR, PREVIOUS, &MessageKey::generate(), &keys)
            .unwrap();

        for key in &keys {
            let plain = open(&codec, &ct, std::slice::from_ref(key), MAX_SLOTS);
            assert_eq!(plain.as_deref(), Some(&b"hello"[..]));
        }
    }

    #[test]
    fn test_max_attempts_bounds_slot_scan() {
        let codec = SlotCodec::new();
        let first = EncryptionKey::generate(KeyScheme::PrivateGroup);
        let second = EncryptionKey::generate(KeyScheme::PrivateGroup);

        let ct = codec
            .seal(
                b"x",
                AUTHOR,
                PREVIOUS,
                &MessageKey::generate(),
                &[first.clone(), second.clone()],
            )
            .unwrap();

        assert!(open(&codec, &ct, &[first], 1).is_some());
        assert!(open(&codec, &ct, &[second.clone()], 1).is_none());
        assert!(open(&codec, &ct, &[second], 2).is_some());
    }

    #[test]
    fn test_context_is_bound() {
        let codec = SlotCodec::new();
        let key = EncryptionKey::generate(KeyScheme::SelfDm);
        let ct = codec
            .seal(b"x", AUTHOR, PREVIOUS, &MessageKey::generate(), &[key.clone()])
            .unwrap();

        let other_previous = b"\x01\x00other";
        let found = codec
            .try_open(&ct, AUTHOR, other_previous, &[key], MAX_SLOTS)
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_scheme_is_bound() {
        let codec = SlotCodec::new();
        let key = EncryptionKey::new([7; 32], KeyScheme::PrivateGroup);
        let ct = codec
            .seal(b"x", AUTHOR, PREVIOUS, &MessageKey::generate(), &[key])
            .unwrap();

        let same_bytes = EncryptionKey::new([7; 32], KeyScheme::SelfDm);
        assert!(open(&codec, &ct, &[same_bytes], MAX_SLOTS).is_none());
    }

    #[test]
    fn test_seal_rejects_bad_counts() {
        let codec = SlotCodec::new();
        let msg_key = MessageKey::generate();
        assert!(codec.seal(b"x", AUTHOR, PREVIOUS, &msg_key, &[]).is_err());

        let too_many: Vec<_> = (0..=MAX_SLOTS)
            .map(|_| EncryptionKey::generate(KeyScheme::PairwiseDm))
            .collect();
        assert!(matches!(
            codec.seal(b"x", AUTHOR, PREVIOUS, &msg_key, &too_many),
            Err(CodecError::InvalidRecipientCount { count: 17, .. })
        ));
    }

    #[test]
    fn test_short_input_is_malformed() {
        let codec = SlotCodec::new();
        let key = EncryptionKey::generate(KeyScheme::SelfDm);
        let result = codec.try_open(&[0u8; 10], AUTHOR, PREVIOUS, &[key], 16);
        assert!(matches!(result, Err(CodecError::MalformedCiphertext(_))));
    }

    #[test]
    fn test_tampered_body_is_not_opened() {
        let codec = SlotCodec::new();
        let key = EncryptionKey::generate(KeyScheme::SelfDm);
        let mut ct = codec
            .seal(b"payload", AUTHOR, PREVIOUS, &MessageKey::generate(), &[key.clone()])
            .unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;

        assert!(open(&codec, &ct, &[key], MAX_SLOTS).is_none());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn slot_opens_within_its_attempt_bound(
                plaintext in proptest::collection::vec(any::<u8>(), 0..256),
                seeds in proptest::collection::vec(any::<[u8; 32]>(), 1..=MAX_SLOTS),
                index in any::<proptest::sample::Index>(),
            ) {
                let codec = SlotCodec::new();
                let keys: Vec<_> = seeds
                    .iter()
                    .map(|seed| EncryptionKey::new(*seed, KeyScheme::PairwiseDm))
                    .collect();
                let ct = codec
                    .seal(&plaintext, AUTHOR, PREVIOUS, &MessageKey::generate(), &keys)
                    .unwrap();

                let slot = index.index(keys.len());
                let key = std::slice::from_ref(&keys[slot]);
                let opened = open(&codec, &ct, key, slot + 1);
                prop_assert_eq!(opened, Some(plaintext));

                // earliest slot holding the same key
                let first = seeds.iter().position(|s| s == &seeds[slot]).unwrap_or(slot);
                if first > 0 {
                    prop_assert!(open(&codec, &ct, key, first).is_none());
                }
            }
        }
    }
}
