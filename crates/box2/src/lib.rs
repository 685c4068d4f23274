//! # box2
//!
//! Multi-recipient envelope encryption for append-only feeds.
//!
//! ## Overview
//!
//! One message is sealed once into an envelope readable by up to 16
//! recipients. Recipients may use different key schemes:
//!
//! - **Self**: the author's own symmetric key
//! - **DM**: a Diffie-Hellman secret shared with one peer
//! - **Group**: the current write key of a private group
//! - **Drop box**: a one-way key derived from a public drop box id
//!
//! Envelopes carry no recipient metadata. Readers find their key by trial
//! decryption, in a fixed order with a fixed number of attempts per scheme.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use box2::{Box2, Box2Config, RecipientId};
//! use box2::core::Keypair;
//!
//! async fn example() -> box2::Result<()> {
//!     let alice = Keypair::generate();
//!     let bob = Keypair::generate();
//!
//!     let engine = Box2::open(Box2Config::default().with_legacy_mode(true), alice.clone()).await?;
//!
//!     let envelope = engine.encrypt(
//!         b"hello bob",
//!         &alice,
//!         None,
//!         &[RecipientId::AuthorSelf, RecipientId::Feed(bob.id())],
//!     )?;
//!
//!     let plaintext = engine.decrypt(&envelope, &alice.id(), None)?;
//!     assert!(!plaintext.is_undecryptable());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `box2::core` - identifiers, keys, derivations and the envelope codec
//! - `box2::store` - key storage backends
//! - `box2::keyring` - the key ring
//! - `box2::forest` - subfeed trees and the forest monitor

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod resolver;
pub mod scheduler;

// Re-export component crates
pub use box2_core as core;
pub use box2_forest as forest;
pub use box2_keyring as keyring;
pub use box2_store as store;

pub use config::Box2Config;
pub use engine::Box2;
pub use error::{Box2Error, Result};
pub use format::{decode_text, encode_text, is_box2_text, BOX2_SUFFIX};
pub use resolver::RecipientResolver;
pub use scheduler::{Batch, BatchKind, Decrypted, DecryptionScheduler};

pub use box2_core::{
    DropBoxId, EncryptionKey, FeedId, GroupId, GroupKeyInfo, KeyScheme, Keypair, MsgId,
    RecipientId,
};
pub use box2_keyring::KeyRing;
