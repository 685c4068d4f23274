//! The forest monitor.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use box2_core::{FeedId, Keypair};
use box2_keyring::{KeyRing, ROOT_LABEL};

use crate::error::{ForestError, Result};
use crate::traits::{ForestSource, Reindexer};
use crate::tree::{Branch, BranchNode, Tree, ROOT_PURPOSE, V1_PURPOSE};

/// Whether `branch` ends at a leaf of someone else's tree:
/// `root / v1 / <single-char shard> / leaf`, without local keys.
pub fn is_foreign_leaf_branch(branch: &[BranchNode]) -> bool {
    branch.len() == 4
        && branch[0].keys.is_none()
        && branch[0].purpose == ROOT_PURPOSE
        && branch[1].purpose == V1_PURPOSE
        && branch[2].purpose.chars().count() == 1
}

/// How one pass over the branch stream ended.
#[derive(Debug, PartialEq, Eq)]
enum Pass {
    /// The stream ended.
    Finished,
    /// The local root was discovered; the subscription must be rebuilt.
    Restart,
}

/// Watches the forest and feeds signing identities, triangles and DM keys
/// into the key ring.
pub struct ForestMonitor {
    keyring: Arc<KeyRing>,
    source: Arc<dyn ForestSource>,
    reindexer: Arc<dyn Reindexer>,
}

impl ForestMonitor {
    pub fn new(
        keyring: Arc<KeyRing>,
        source: Arc<dyn ForestSource>,
        reindexer: Arc<dyn Reindexer>,
    ) -> Self {
        Self {
            keyring,
            source,
            reindexer,
        }
    }

    /// Run the monitor in a background task.
    ///
    /// Dropping the returned handle also stops the monitor.
    pub fn spawn(self) -> MonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tokio::select! {
                result = self.run() => result,
                _ = stop_rx.changed() => {
                    tracing::debug!("forest monitor stopped");
                    Ok(())
                }
            }
        });

        MonitorHandle { stop_tx, task }
    }

    /// Monitor until the branch stream ends.
    ///
    /// Discovering the local root aborts the current subscription, reindexes
    /// and starts over with a fresh subscription.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.run_once().await? {
                Pass::Finished => return Ok(()),
                Pass::Restart => {
                    self.reindex().await;
                    tracing::info!("restarting forest monitor after root discovery");
                }
            }
        }
    }

    async fn run_once(&self) -> Result<Pass> {
        self.keyring.ready().await?;
        let mut root = self.keyring.root_signing_identity()?;

        let mut branches = self
            .source
            .branch_stream()
            .await
            .map_err(ForestError::Source)?;

        while let Some(branch) = branches.recv().await {
            if self.register_own_nodes(&branch, &mut root).await? {
                // the receiver is dropped here, ending the subscription
                return Ok(Pass::Restart);
            }

            if let Some(root) = &root {
                if is_foreign_leaf_branch(&branch) {
                    self.triangulate(root, &branch).await?;
                }
            }
        }

        Ok(Pass::Finished)
    }

    /// Register the signing identities of every owned node on `branch`.
    ///
    /// Returns `true` if this branch revealed the local root for the first time.
    async fn register_own_nodes(
        &self,
        branch: &Branch,
        root: &mut Option<Keypair>,
    ) -> Result<bool> {
        let mut found_root = false;

        for (i, node) in branch.iter().enumerate() {
            let Some(keys) = &node.keys else { continue };

            self.keyring.add_signing_identity(keys.clone(), None).await?;

            if i == 0 && node.purpose == ROOT_PURPOSE && root.is_none() {
                found_root = self
                    .keyring
                    .add_signing_identity(keys.clone(), Some(ROOT_LABEL))
                    .await?;
                *root = Some(keys.clone());
            }
        }

        Ok(found_root)
    }

    /// Pair a foreign leaf with the local leaf of the same purpose.
    async fn triangulate(&self, my_root: &Keypair, their_branch: &Branch) -> Result<()> {
        let their_root = their_branch[0].id;
        let their_leaf = &their_branch[3];

        let my_branches = self
            .source
            .branches(&my_root.id())
            .await
            .map_err(ForestError::Source)?;
        let Some(my_tree) = Tree::build(&my_root.id(), &my_branches) else {
            return Ok(());
        };
        let Some(my_leaf) = my_tree.find_leaf(&their_leaf.purpose) else {
            return Ok(());
        };
        let leaf_keys = self.leaf_keys(my_leaf.id(), my_leaf.node.keys.as_ref())?;
        let Some(my_leaf_keys) = leaf_keys else {
            tracing::debug!(leaf = %my_leaf.id(), "no keys for local leaf");
            return Ok(());
        };

        self.keyring
            .add_triangle(my_root.id(), my_leaf_keys.id(), their_leaf.id)
            .await?;
        self.keyring
            .add_triangle(their_root, their_leaf.id, my_leaf_keys.id())
            .await?;

        match self.keyring.add_dm_pair(&my_leaf_keys, &their_leaf.id) {
            Ok(true) => {
                tracing::debug!(
                    purpose = %their_leaf.purpose,
                    their_leaf = %their_leaf.id,
                    "derived DM key for mirrored leaf"
                );
                self.reindex().await;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("cannot derive DM key with {}: {}", their_leaf.id, e),
        }

        Ok(())
    }

    fn leaf_keys(&self, id: &FeedId, keys: Option<&Keypair>) -> Result<Option<Keypair>> {
        match keys {
            Some(keys) => Ok(Some(keys.clone())),
            None => Ok(self.keyring.signing_identity(id)?),
        }
    }

    /// Reindex failures are logged, never fatal to the monitor.
    async fn reindex(&self) {
        if let Err(e) = self.reindexer.reindex_encrypted().await {
            tracing::warn!("reindexing encrypted messages failed: {:#}", e);
        }
    }
}

/// Handle to a spawned [`ForestMonitor`].
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl MonitorHandle {
    /// Ask the monitor to stop without waiting for it.
    pub fn abort(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether the monitor task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the monitor and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.abort();
        self.join().await
    }

    /// Wait for the monitor to exit on its own.
    pub async fn join(self) -> Result<()> {
        let MonitorHandle { stop_tx, task } = self;
        let result = task.await.map_err(|e| ForestError::Task(e.to_string()))?;
        drop(stop_tx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign(b: u8, purpose: &str) -> BranchNode {
        BranchNode::foreign(FeedId::from_bytes([b; 32]), purpose)
    }

    #[test]
    fn test_foreign_leaf_shape() {
        let branch = vec![
            foreign(1, "root"),
            foreign(2, "v1"),
            foreign(3, "c"),
            foreign(4, "dm"),
        ];
        assert!(is_foreign_leaf_branch(&branch));

        assert!(!is_foreign_leaf_branch(&branch[..3]));

        let mut owned = branch.clone();
        owned[0] = BranchNode::owned(Keypair::generate(), "root");
        assert!(!is_foreign_leaf_branch(&owned));

        let mut wide_shard = branch.clone();
        wide_shard[2].purpose = "cd".into();
        assert!(!is_foreign_leaf_branch(&wide_shard));

        let mut not_v1 = branch;
        not_v1[1].purpose = "v2".into();
        assert!(!is_foreign_leaf_branch(&not_v1));
    }
}
