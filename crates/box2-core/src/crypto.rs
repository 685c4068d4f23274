//! Key material and key derivations.
//!
//! Feeds sign with Ed25519. For key agreement the Ed25519 keys are converted
//! to their X25519 (Montgomery) form, so a feed id doubles as a DH public key.
//! All derived keys pass through Blake3 in key-derivation mode with a
//! per-purpose context string.

use std::fmt;

use blake3::Hasher;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CoreError;
use crate::keys::{EncryptionKey, KeyScheme};
use crate::types::{DropBoxId, FeedId};

const DM_KEY_CONTEXT: &str = "box2 2021-06 pairwise dm key";
const DROP_BOX_KEY_CONTEXT: &str = "box2 2021-06 drop box key";

/// Blake3 key derivation over length-prefixed parts.
pub(crate) fn derive_key(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(&(part.len() as u32).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// An Ed25519 signing identity for a feed.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// The feed id (public key) of this keypair.
    pub fn id(&self) -> FeedId {
        FeedId(self.signing_key.verifying_key().to_bytes())
    }

    /// Get the raw seed bytes (secret key material).
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The X25519 secret matching this identity's Montgomery public key.
    fn x25519_secret(&self) -> StaticSecret {
        StaticSecret::from(self.signing_key.to_scalar_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.id())
    }
}

/// Convert a feed id to its X25519 public key.
fn feed_x25519_public(feed: &FeedId) -> Result<PublicKey, CoreError> {
    let verifying = VerifyingKey::from_bytes(feed.as_bytes())
        .map_err(|e| CoreError::InvalidPublicKey(format!("{}: {}", feed, e)))?;
    Ok(PublicKey::from(verifying.to_montgomery().to_bytes()))
}

fn agree(
    secret: &StaticSecret,
    public: &PublicKey,
    peer: &dyn fmt::Display,
) -> Result<[u8; 32], CoreError> {
    let shared = secret.diffie_hellman(public);
    if !shared.was_contributory() {
        return Err(CoreError::NonContributory(peer.to_string()));
    }
    Ok(*shared.as_bytes())
}

/// Derive the pairwise DM key between a local identity and a remote feed.
///
/// Symmetric: `derive_dm_key(a, b.id()) == derive_dm_key(b, a.id())`.
pub fn derive_dm_key(local: &Keypair, remote: &FeedId) -> Result<EncryptionKey, CoreError> {
    let public = feed_x25519_public(remote)?;
    let shared = agree(&local.x25519_secret(), &public, remote)?;

    let local_id = local.id();
    let (low, high) = if local_id <= *remote {
        (local_id, *remote)
    } else {
        (*remote, local_id)
    };

    let bytes = derive_key(DM_KEY_CONTEXT, &[&shared, low.as_bytes(), high.as_bytes()]);
    Ok(EncryptionKey::new(bytes, KeyScheme::PairwiseDm))
}

/// The secret half of a drop box.
#[derive(Clone)]
pub struct DropBoxSecret([u8; 32]);

impl DropBoxSecret {
    /// Generate a new random drop box secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The public drop box id for this secret.
    pub fn id(&self) -> DropBoxId {
        let public = PublicKey::from(&StaticSecret::from(self.0));
        DropBoxId(*public.as_bytes())
    }
}

impl fmt::Debug for DropBoxSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DropBoxSecret({:?})", self.id())
    }
}

fn drop_box_key(shared: &[u8; 32], author: &FeedId, drop_box: &DropBoxId) -> EncryptionKey {
    let bytes = derive_key(
        DROP_BOX_KEY_CONTEXT,
        &[shared, author.as_bytes(), drop_box.as_bytes()],
    );
    EncryptionKey::new(bytes, KeyScheme::DropBox)
}

/// Key an author uses to encrypt towards a drop box.
pub fn derive_drop_box_send_key(
    author: &Keypair,
    drop_box: &DropBoxId,
) -> Result<EncryptionKey, CoreError> {
    let public = PublicKey::from(drop_box.0);
    let shared = agree(&author.x25519_secret(), &public, drop_box)?;
    Ok(drop_box_key(&shared, &author.id(), drop_box))
}

/// Key a drop box holder uses to read a message from `author`.
pub fn derive_drop_box_receive_key(
    secret: &DropBoxSecret,
    author: &FeedId,
) -> Result<EncryptionKey, CoreError> {
    let public = feed_x25519_public(author)?;
    let shared = agree(&StaticSecret::from(secret.0), &public, author)?;
    Ok(drop_box_key(&shared, author, &secret.id()))
}
