//! Collaborators the monitor depends on.

use async_trait::async_trait;
use tokio::sync::mpsc;

use box2_core::FeedId;

use crate::tree::Branch;

/// A live stream of branches.
pub type BranchStream = mpsc::Receiver<Branch>;

/// Provides the branches of the subfeed forest.
#[async_trait]
pub trait ForestSource: Send + Sync {
    /// Subscribe to every branch of every tree: known branches are replayed
    /// first, then new ones arrive as they are discovered. Dropping the
    /// receiver ends the subscription.
    async fn branch_stream(&self) -> anyhow::Result<BranchStream>;

    /// The current branches of the tree rooted at `root`.
    async fn branches(&self, root: &FeedId) -> anyhow::Result<Vec<Branch>>;
}

/// Re-attempts decryption of messages that were undecryptable so far.
#[async_trait]
pub trait Reindexer: Send + Sync {
    async fn reindex_encrypted(&self) -> anyhow::Result<()>;
}
