//! # box2 Forest
//!
//! Every actor owns a tree of purpose-tagged subfeeds:
//!
//! ```text
//! root ── v1 ── <shard> ── <leaf purpose>
//! ```
//!
//! The [`ForestMonitor`] watches the branches of all trees (the forest). For
//! the actor's own branches it registers signing identities with the key
//! ring. For a peer's leaf it looks up the local leaf with the same purpose,
//! records the triangle between the two trees and derives the DM key for
//! the mirrored leaf pair, asking the [`Reindexer`] to retry decryption of
//! old messages whenever new keys become usable.

pub mod error;
pub mod monitor;
pub mod traits;
pub mod tree;

pub use error::{ForestError, Result};
pub use monitor::{is_foreign_leaf_branch, ForestMonitor, MonitorHandle};
pub use traits::{BranchStream, ForestSource, Reindexer};
pub use tree::{Branch, BranchNode, Tree};
