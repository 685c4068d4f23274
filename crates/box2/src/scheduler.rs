//! Trial decryption.
//!
//! Candidate keys are tried in a fixed order of batches. Each batch has a
//! fixed attempt bound, so the work done does not depend on which scheme
//! ends up matching:
//!
//! | batch    | keys                                  | attempts |
//! |----------|---------------------------------------|----------|
//! | group    | every group read key                  | 1        |
//! | self     | own self keys, if the author is local | 16       |
//! | DM       | the DM key with the author            | 16       |
//! | drop box | one derived key per held drop box     | 16       |
//!
//! Groups are only ever sealed into slot 0, so one attempt suffices there.

use std::sync::Arc;

use box2_core::{EncryptionKey, EnvelopeCodec, FeedId, Keypair, MsgId, Tag, MAX_SLOTS};
use box2_keyring::KeyRing;

use crate::error::Result;

/// Outcome of a decryption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    Plaintext(Vec<u8>),
    /// None of the local keys opens the envelope.
    Undecryptable,
}

impl Decrypted {
    pub fn is_undecryptable(&self) -> bool {
        matches!(self, Decrypted::Undecryptable)
    }

    pub fn into_plaintext(self) -> Option<Vec<u8>> {
        match self {
            Decrypted::Plaintext(plaintext) => Some(plaintext),
            Decrypted::Undecryptable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Group,
    SelfKey,
    Dm,
    DropBox,
}

impl BatchKind {
    /// Batches in the order they are tried.
    pub const ORDER: [BatchKind; 4] = [
        BatchKind::Group,
        BatchKind::SelfKey,
        BatchKind::Dm,
        BatchKind::DropBox,
    ];

    pub const fn max_attempts(&self) -> usize {
        match self {
            BatchKind::Group => 1,
            _ => MAX_SLOTS,
        }
    }
}

/// One set of candidate keys.
#[derive(Debug, Clone)]
pub struct Batch {
    pub kind: BatchKind,
    pub keys: Vec<EncryptionKey>,
    pub max_attempts: usize,
}

/// Builds candidate batches from the key ring and trial-decrypts.
pub struct DecryptionScheduler {
    keyring: Arc<KeyRing>,
    codec: Arc<dyn EnvelopeCodec>,
    main: Keypair,
    legacy_mode: bool,
}

impl DecryptionScheduler {
    pub fn new(
        keyring: Arc<KeyRing>,
        codec: Arc<dyn EnvelopeCodec>,
        main: Keypair,
        legacy_mode: bool,
    ) -> Self {
        Self {
            keyring,
            codec,
            main,
            legacy_mode,
        }
    }

    /// Try every batch in order until one opens the envelope.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        author: &FeedId,
        previous: Option<&MsgId>,
    ) -> Result<Decrypted> {
        let author_tag = author.tag();
        let previous_tag = previous.copied().tag();

        for kind in BatchKind::ORDER {
            let Some(batch) = self.batch(kind, author)? else {
                continue;
            };

            let msg_key = self.codec.try_open(
                ciphertext,
                &author_tag,
                &previous_tag,
                &batch.keys,
                batch.max_attempts,
            )?;
            let Some(msg_key) = msg_key else { continue };

            let plaintext = self
                .codec
                .open_body(ciphertext, &author_tag, &previous_tag, &msg_key)?;
            return Ok(match plaintext {
                Some(plaintext) => Decrypted::Plaintext(plaintext),
                None => {
                    tracing::debug!(author = %author, "message key found but body did not open");
                    Decrypted::Undecryptable
                }
            });
        }

        Ok(Decrypted::Undecryptable)
    }

    /// All non-empty batches for a message from `author`, in trial order.
    pub fn batches(&self, author: &FeedId) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();
        for kind in BatchKind::ORDER {
            if let Some(batch) = self.batch(kind, author)? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    fn batch(&self, kind: BatchKind, author: &FeedId) -> Result<Option<Batch>> {
        let keys = match kind {
            BatchKind::Group => self.keyring.group_read_keys()?,
            BatchKind::SelfKey => {
                if self.keyring.is_local_identity(author)? {
                    self.keyring.self_keys()?
                } else {
                    Vec::new()
                }
            }
            BatchKind::Dm => self.dm_key(author)?.into_iter().collect(),
            BatchKind::DropBox => self.keyring.drop_box_receive_keys(author)?,
        };

        if keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(Batch {
            kind,
            keys,
            max_attempts: kind.max_attempts(),
        }))
    }

    /// The DM key to try for `author`, deriving it if needed.
    fn dm_key(&self, author: &FeedId) -> Result<Option<EncryptionKey>> {
        let local = if self.legacy_mode {
            if *author == self.main.id() {
                return Ok(None);
            }
            self.main.clone()
        } else {
            let Some(root) = self.keyring.root_signing_identity()? else {
                return Ok(None);
            };
            let Some(my_leaf) = self.keyring.triangulate(&root.id(), author)? else {
                return Ok(None);
            };
            let Some(keys) = self.keyring.signing_identity(&my_leaf)? else {
                return Ok(None);
            };
            keys
        };

        match self.keyring.dm_key(&local, author) {
            Ok(key) => Ok(Some(key)),
            Err(e) => {
                tracing::debug!(author = %author, "no DM key: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box2_core::{DropBoxSecret, GroupId, GroupKeyInfo, SlotCodec};
    use box2_store::MemoryStorage;

    async fn scheduler(main: &Keypair) -> (DecryptionScheduler, Arc<KeyRing>) {
        let keyring = KeyRing::open(Arc::new(MemoryStorage::new()));
        keyring.ready().await.unwrap();
        keyring
            .add_signing_identity(main.clone(), None)
            .await
            .unwrap();
        let scheduler = DecryptionScheduler::new(
            keyring.clone(),
            Arc::new(SlotCodec::new()),
            main.clone(),
            true,
        );
        (scheduler, keyring)
    }

    #[tokio::test]
    async fn test_batch_order_and_bounds() {
        let main = Keypair::generate();
        let (scheduler, keyring) = scheduler(&main).await;
        keyring
            .add_group_info(
                GroupId::from_bytes([1; 32]),
                GroupKeyInfo::new([2; 32], MsgId::from_bytes([0; 32])),
            )
            .await
            .unwrap();
        let drop_box = DropBoxSecret::generate();
        keyring
            .add_drop_box(drop_box.id(), drop_box)
            .await
            .unwrap();

        let foreign = Keypair::generate().id();
        let batches = scheduler.batches(&foreign).unwrap();
        let shape: Vec<_> = batches.iter().map(|b| (b.kind, b.max_attempts)).collect();
        assert_eq!(
            shape,
            vec![
                (BatchKind::Group, 1),
                (BatchKind::Dm, 16),
                (BatchKind::DropBox, 16),
            ]
        );

        let own = scheduler.batches(&main.id()).unwrap();
        let kinds: Vec<_> = own.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BatchKind::Group, BatchKind::SelfKey, BatchKind::DropBox]
        );
    }

    #[tokio::test]
    async fn test_empty_key_ring_is_undecryptable() {
        let main = Keypair::generate();
        let (scheduler, _) = scheduler(&main).await;
        let other = Keypair::generate();

        let codec = SlotCodec::new();
        let ct = codec
            .seal(
                b"secret",
                &other.id().tag(),
                &None::<MsgId>.tag(),
                &box2_core::MessageKey::generate(),
                &[EncryptionKey::generate(box2_core::KeyScheme::PairwiseDm)],
            )
            .unwrap();

        assert_eq!(
            scheduler.decrypt(&ct, &other.id(), None).unwrap(),
            Decrypted::Undecryptable
        );
    }

    #[tokio::test]
    async fn test_short_ciphertext_is_malformed() {
        let main = Keypair::generate();
        let (scheduler, _) = scheduler(&main).await;
        let err = scheduler
            .decrypt(&[1, 2, 3], &Keypair::generate().id(), None)
            .unwrap_err();
        assert!(matches!(err, crate::Box2Error::MalformedCiphertext(_)));
    }
}
