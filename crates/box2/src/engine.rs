//! The box2 engine: the encrypt and decrypt paths over one key ring.

use std::sync::Arc;

use bytes::Bytes;

use box2_core::{
    EnvelopeCodec, FeedId, FeedIdentifier, GroupId, Keypair, MessageKey, MsgId, RecipientId,
    SigilFeedIdentifier, SlotCodec, Tag,
};
use box2_forest::{ForestMonitor, ForestSource, MonitorHandle, Reindexer};
use box2_keyring::KeyRing;
use box2_store::{KeyStorage, MemoryStorage, SqliteStorage};

use crate::config::Box2Config;
use crate::error::Result;
use crate::format::{decode_text, encode_text};
use crate::resolver::RecipientResolver;
use crate::scheduler::{Decrypted, DecryptionScheduler};

/// A box2 engine for one local actor.
///
/// Owns the key ring and wires the recipient resolver and decryption
/// scheduler to it. Cheap to share behind an `Arc`.
pub struct Box2 {
    config: Box2Config,
    /// The actor's main identity.
    main: Keypair,
    keyring: Arc<KeyRing>,
    codec: Arc<dyn EnvelopeCodec>,
    resolver: RecipientResolver,
    scheduler: DecryptionScheduler,
}

impl Box2 {
    /// Open an engine, with keys persisted under `config.keyring_path` or
    /// kept in memory if no path is set.
    ///
    /// Waits for the key ring to load and registers `main` as a local
    /// signing identity.
    pub async fn open(config: Box2Config, main: Keypair) -> Result<Self> {
        let storage: Arc<dyn KeyStorage> = match (&config.keyring_path, config.keyring_db()) {
            (Some(dir), Some(db)) => {
                tokio::fs::create_dir_all(dir).await?;
                Arc::new(SqliteStorage::open(db)?)
            }
            _ => Arc::new(MemoryStorage::new()),
        };
        Self::open_with_storage(config, main, storage).await
    }

    /// Open an engine over a caller-supplied key storage.
    pub async fn open_with_storage(
        config: Box2Config,
        main: Keypair,
        storage: Arc<dyn KeyStorage>,
    ) -> Result<Self> {
        let keyring = KeyRing::open(storage);
        keyring.ready().await?;
        keyring.add_signing_identity(main.clone(), None).await?;

        let codec: Arc<dyn EnvelopeCodec> = Arc::new(SlotCodec::new());
        let feeds: Arc<dyn FeedIdentifier> = Arc::new(SigilFeedIdentifier);
        let resolver = RecipientResolver::new(keyring.clone(), feeds, config.legacy_mode);
        let scheduler = DecryptionScheduler::new(
            keyring.clone(),
            codec.clone(),
            main.clone(),
            config.legacy_mode,
        );

        tracing::debug!(
            main = %main.id(),
            legacy_mode = config.legacy_mode,
            "box2 engine opened"
        );

        Ok(Self {
            config,
            main,
            keyring,
            codec,
            resolver,
            scheduler,
        })
    }

    pub fn config(&self) -> &Box2Config {
        &self.config
    }

    /// The key ring shared by every component of this engine.
    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    pub fn main_id(&self) -> FeedId {
        self.main.id()
    }

    pub fn resolver(&self) -> &RecipientResolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &DecryptionScheduler {
        &self.scheduler
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encryption
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal `plaintext` for `recipients`, authored by `author` after `previous`.
    ///
    /// Recipients are validated before any key is derived or generated. The
    /// message key lives only for the duration of this call.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        author: &Keypair,
        previous: Option<&MsgId>,
        recipients: &[RecipientId],
    ) -> Result<Bytes> {
        let keys = self.resolver.resolve(recipients, author)?;

        let msg_key = MessageKey::generate();
        let ciphertext = self.codec.seal(
            plaintext,
            &author.id().tag(),
            &previous.copied().tag(),
            &msg_key,
            &keys,
        )?;

        tracing::debug!(
            author = %author.id(),
            recipients = keys.len(),
            "sealed envelope"
        );
        Ok(Bytes::from(ciphertext))
    }

    /// Like [`encrypt`](Self::encrypt), with recipients given as identifiers.
    pub fn encrypt_raw(
        &self,
        plaintext: &[u8],
        author: &Keypair,
        previous: Option<&MsgId>,
        recipients: &[&str],
    ) -> Result<Bytes> {
        let recipients = recipients
            .iter()
            .map(|r| self.resolver.classify(r))
            .collect::<Result<Vec<_>>>()?;
        self.encrypt(plaintext, author, previous, &recipients)
    }

    /// Like [`encrypt`](Self::encrypt), returning the `<base64>.box2` form.
    pub fn encrypt_text(
        &self,
        plaintext: &[u8],
        author: &Keypair,
        previous: Option<&MsgId>,
        recipients: &[RecipientId],
    ) -> Result<String> {
        let ciphertext = self.encrypt(plaintext, author, previous, recipients)?;
        Ok(encode_text(&ciphertext))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decryption
    // ─────────────────────────────────────────────────────────────────────────

    /// Trial-decrypt an envelope claimed to be authored by `author`.
    ///
    /// Returns [`Decrypted::Undecryptable`] when no local key opens it.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        author: &FeedId,
        previous: Option<&MsgId>,
    ) -> Result<Decrypted> {
        self.scheduler.decrypt(ciphertext, author, previous)
    }

    /// Decrypt the `<base64>.box2` form.
    pub fn decrypt_text(
        &self,
        text: &str,
        author: &FeedId,
        previous: Option<&MsgId>,
    ) -> Result<Decrypted> {
        let ciphertext = decode_text(text)?;
        self.decrypt(&ciphertext, author, previous)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recipients
    // ─────────────────────────────────────────────────────────────────────────

    /// Map a textual identifier to a recipient.
    pub fn classify(&self, recipient: &str) -> Result<RecipientId> {
        self.resolver.classify(recipient)
    }

    /// Whether `recipient` should be sent box2 envelopes.
    pub fn supports_box2(&self, recipient: &str) -> Result<bool> {
        if self.config.always_box2 {
            return Ok(true);
        }
        match recipient.parse::<GroupId>() {
            Ok(group) => Ok(self.keyring.has_group(&group)?),
            Err(_) => Ok(false),
        }
    }

    /// Whether a DM key with `their_root` is available from `my_leaf`.
    pub fn can_dm(&self, my_leaf: &FeedId, their_root: &FeedId) -> Result<bool> {
        Ok(self.keyring.can_dm(my_leaf, their_root)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a [`ForestMonitor`] feeding this engine's key ring.
    pub fn spawn_forest_monitor(
        &self,
        source: Arc<dyn ForestSource>,
        reindexer: Arc<dyn Reindexer>,
    ) -> MonitorHandle {
        ForestMonitor::new(self.keyring.clone(), source, reindexer).spawn()
    }

    /// Wait for pending key ring operations and close the key storage.
    pub async fn close(&self) -> Result<()> {
        Ok(self.keyring.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine(config: Box2Config) -> (Box2, Keypair) {
        let main = Keypair::generate();
        let engine = Box2::open(config, main.clone()).await.unwrap();
        (engine, main)
    }

    #[tokio::test]
    async fn test_open_registers_main_identity() {
        let (engine, main) = engine(Box2Config::default()).await;
        assert!(engine.keyring().is_ready());
        assert!(engine.keyring().is_local_identity(&main.id()).unwrap());
        assert_eq!(engine.main_id(), main.id());
    }

    #[tokio::test]
    async fn test_self_round_trip() {
        let (engine, main) = engine(Box2Config::default()).await;
        let previous = MsgId::from_bytes([7; 32]);

        let ct = engine
            .encrypt(b"note to self", &main, Some(&previous), &[RecipientId::AuthorSelf])
            .unwrap();
        let out = engine.decrypt(&ct, &main.id(), Some(&previous)).unwrap();
        assert_eq!(out.into_plaintext().unwrap(), b"note to self");

        // previous is bound into the envelope
        assert!(engine.decrypt(&ct, &main.id(), None).unwrap().is_undecryptable());
    }

    #[tokio::test]
    async fn test_empty_recipients_fail_before_sealing() {
        let (engine, main) = engine(Box2Config::default()).await;
        let err = engine.encrypt(b"x", &main, None, &[]).unwrap_err();
        assert!(matches!(err, crate::Box2Error::InvalidRecipients { count: 0, .. }));
    }

    #[tokio::test]
    async fn test_supports_box2() {
        let (box2, _) = engine(Box2Config::default()).await;
        let group = GroupId::from_bytes([5; 32]);
        assert!(!box2.supports_box2(&group.to_string()).unwrap());
        assert!(!box2.supports_box2("@not-a-group").unwrap());

        box2
            .keyring()
            .add_group_info(
                group,
                box2_core::GroupKeyInfo::new([6; 32], MsgId::from_bytes([0; 32])),
            )
            .await
            .unwrap();
        assert!(box2.supports_box2(&group.to_string()).unwrap());

        let (always, _) = engine(Box2Config::default().with_always_box2(true)).await;
        assert!(always.supports_box2("anything").unwrap());
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let (engine, main) = engine(Box2Config::default()).await;
        let text = engine
            .encrypt_text(b"hello", &main, None, &[RecipientId::AuthorSelf])
            .unwrap();
        assert!(text.ends_with(".box2"));
        let out = engine.decrypt_text(&text, &main.id(), None).unwrap();
        assert_eq!(out, Decrypted::Plaintext(b"hello".to_vec()));
    }
}
