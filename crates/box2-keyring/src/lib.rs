//! # box2 Key Ring
//!
//! The single owner of all key material used by box2:
//!
//! - **Self** keys, the actor's own symmetric keys
//! - **DM** keys, pairwise Diffie-Hellman secrets cached by `(local, remote)`
//! - **Group** keys, one [`GroupInfo`](box2_core::GroupInfo) per private group
//! - **Drop boxes**, secrets for drop boxes this actor can read
//! - **Signing** identities, the subfeeds of the actor's tree, plus the
//!   triangulation map used to pick DM keys between mirrored leaves
//!
//! A [`KeyRing`] is created with [`KeyRing::open`], which starts loading the
//! storage in the background. Until loading completes:
//!
//! - `async` operations queue and run in issue order once loaded
//! - synchronous operations fail fast with [`KeyRingError::NotReady`]
//!
//! Await [`KeyRing::ready`] to wait for the load explicitly.

pub mod error;
pub mod keyring;

pub use error::{KeyRingError, Result};
pub use keyring::{KeyRing, ROOT_LABEL};
