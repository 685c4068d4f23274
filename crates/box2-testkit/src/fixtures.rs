//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use box2::{Box2, Box2Config, Result};
use box2_core::{FeedId, Keypair};
use box2_forest::{Branch, BranchNode, BranchStream, ForestSource, Reindexer};

/// Shard of the single leaf in an [`ActorTree`].
pub const SHARD_PURPOSE: &str = "d";
/// Purpose of the DM leaf in an [`ActorTree`].
pub const DM_PURPOSE: &str = "dm";

/// An actor with its own key ring.
pub struct TestActor {
    pub keypair: Keypair,
    pub engine: Box2,
}

impl TestActor {
    /// An actor that derives DM keys between main identities.
    pub async fn legacy() -> Result<Self> {
        Self::with_config(Box2Config::default().with_legacy_mode(true)).await
    }

    /// An actor that derives DM keys between mirrored subfeeds.
    pub async fn tree() -> Result<Self> {
        Self::with_config(Box2Config::default()).await
    }

    pub async fn with_config(config: Box2Config) -> Result<Self> {
        let keypair = Keypair::generate();
        let engine = Box2::open(config, keypair.clone()).await?;
        Ok(Self { keypair, engine })
    }

    pub fn id(&self) -> FeedId {
        self.keypair.id()
    }
}

/// Keys of a minimal subfeed tree: `root / v1 / d / dm`.
#[derive(Debug, Clone)]
pub struct ActorTree {
    pub root: Keypair,
    pub v1: Keypair,
    pub shard: Keypair,
    pub leaf: Keypair,
}

impl ActorTree {
    pub fn generate() -> Self {
        Self {
            root: Keypair::generate(),
            v1: Keypair::generate(),
            shard: Keypair::generate(),
            leaf: Keypair::generate(),
        }
    }

    fn nodes(&self) -> [(&Keypair, &'static str); 4] {
        [
            (&self.root, "root"),
            (&self.v1, "v1"),
            (&self.shard, SHARD_PURPOSE),
            (&self.leaf, DM_PURPOSE),
        ]
    }

    /// Every branch of the tree, as seen by its owner.
    pub fn owned_branches(&self) -> Vec<Branch> {
        self.branches(|keys, purpose| BranchNode::owned(keys.clone(), purpose))
    }

    /// Every branch of the tree, as seen by anyone else.
    pub fn foreign_branches(&self) -> Vec<Branch> {
        self.branches(|keys, purpose| BranchNode::foreign(keys.id(), purpose))
    }

    fn branches(&self, node: impl Fn(&Keypair, &str) -> BranchNode) -> Vec<Branch> {
        let nodes: Vec<BranchNode> = self
            .nodes()
            .iter()
            .map(|(keys, purpose)| node(keys, purpose))
            .collect();
        (1..=nodes.len()).map(|n| nodes[..n].to_vec()).collect()
    }
}

#[derive(Default)]
struct ForestState {
    branches: Vec<Branch>,
    subscribers: Vec<mpsc::Sender<Branch>>,
}

/// An in-memory forest.
///
/// Each subscription replays every known branch, then receives branches
/// pushed later until [`FakeForest::end_streams`] is called.
#[derive(Default)]
pub struct FakeForest {
    state: Mutex<ForestState>,
    subscriptions: AtomicUsize,
}

impl FakeForest {
    const STREAM_CAPACITY: usize = 1024;

    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, branch: Branch) {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|tx| tx.try_send(branch.clone()).is_ok());
        state.branches.push(branch);
    }

    pub fn push_all(&self, branches: impl IntoIterator<Item = Branch>) {
        for branch in branches {
            self.push(branch);
        }
    }

    /// End every open subscription after its queued branches.
    pub fn end_streams(&self) {
        self.lock().subscribers.clear();
    }

    /// How many times a branch stream has been opened.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ForestState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ForestSource for FakeForest {
    async fn branch_stream(&self) -> anyhow::Result<BranchStream> {
        let (tx, rx) = mpsc::channel(Self::STREAM_CAPACITY);
        let mut state = self.lock();
        for branch in &state.branches {
            tx.try_send(branch.clone())
                .map_err(|e| anyhow::anyhow!("replay failed: {}", e))?;
        }
        state.subscribers.push(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn branches(&self, root: &FeedId) -> anyhow::Result<Vec<Branch>> {
        Ok(self
            .lock()
            .branches
            .iter()
            .filter(|b| b.first().is_some_and(|n| &n.id == root))
            .cloned()
            .collect())
    }
}

/// A reindexer that only counts its invocations.
#[derive(Default)]
pub struct RecordingReindexer {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingReindexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A reindexer whose every call fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reindexer for RecordingReindexer {
    async fn reindex_encrypted(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("reindex refused");
        }
        Ok(())
    }
}

/// Poll `condition` until it holds, or panic after five seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_tree_branches() {
        let tree = ActorTree::generate();
        let branches = tree.foreign_branches();
        assert_eq!(branches.len(), 4);
        assert_eq!(branches[3].len(), 4);
        assert_eq!(branches[3][3].id, tree.leaf.id());
        assert!(branches.iter().flatten().all(|n| n.keys.is_none()));
        assert!(tree.owned_branches().iter().flatten().all(|n| n.keys.is_some()));
    }

    #[tokio::test]
    async fn test_fake_forest_replays_then_streams() {
        let forest = FakeForest::new();
        let tree = ActorTree::generate();
        let mut branches = tree.foreign_branches().into_iter();
        forest.push(branches.next().unwrap());

        let mut stream = forest.branch_stream().await.unwrap();
        forest.push(branches.next().unwrap());
        forest.end_streams();

        assert_eq!(stream.recv().await.unwrap().len(), 1);
        assert_eq!(stream.recv().await.unwrap().len(), 2);
        assert!(stream.recv().await.is_none());
        assert_eq!(forest.subscriptions(), 1);
        assert_eq!(forest.branches(&tree.root.id()).await.unwrap().len(), 2);
    }
}
