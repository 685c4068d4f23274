//! # box2 Store
//!
//! Persistence for key ring material. The key ring loads every record once
//! at startup and writes each mutation through, so storage only needs to
//! support "load everything" and "upsert one".
//!
//! ## Key Types
//!
//! - [`KeyStorage`] - The async trait for record persistence
//! - [`SqliteStorage`] - SQLite-based persistent storage
//! - [`MemoryStorage`] - In-memory storage for tests and ephemeral actors
//! - [`KeyRecord`] - One persisted unit of key material
//!
//! ## Usage
//!
//! ```rust,no_run
//! use box2_store::{KeyRecord, KeyStorage, SqliteStorage};
//! use box2_core::{EncryptionKey, KeyScheme};
//!
//! async fn example() {
//!     let storage = SqliteStorage::open("keyring.db").unwrap();
//!     let key = EncryptionKey::generate(KeyScheme::SelfDm);
//!     storage.put(&KeyRecord::SelfKey { key }).await.unwrap();
//!     let records = storage.load_all().await.unwrap();
//!     assert_eq!(records.len(), 1);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Upserts**: a record replaces any earlier record with the same
//!   [`RecordKind`] and id, and moves to the end.
//! - **Ordering**: `load_all` returns records in last-write order, so
//!   replaying them rebuilds the state as it was last written.
//! - **DM secrets are never stored**: they are re-derivable.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{KeyRecord, KeyStorage, RecordKind};
