//! Subfeed trees.
//!
//! A [`Branch`] is the path from a root to one of its nodes. A [`Tree`] is
//! assembled from all branches sharing a root; it is an immutable value.

use std::fmt;

use box2_core::{FeedId, Keypair};

/// Purpose of the version node directly below a root.
pub const V1_PURPOSE: &str = "v1";
pub const ROOT_PURPOSE: &str = "root";

/// One subfeed on a branch.
#[derive(Clone)]
pub struct BranchNode {
    pub id: FeedId,
    pub purpose: String,
    /// Present when the subfeed belongs to the local actor.
    pub keys: Option<Keypair>,
}

impl BranchNode {
    /// A node of a foreign tree.
    pub fn foreign(id: FeedId, purpose: impl Into<String>) -> Self {
        Self {
            id,
            purpose: purpose.into(),
            keys: None,
        }
    }

    /// A node of the local actor's tree.
    pub fn owned(keys: Keypair, purpose: impl Into<String>) -> Self {
        Self {
            id: keys.id(),
            purpose: purpose.into(),
            keys: Some(keys),
        }
    }
}

impl fmt::Debug for BranchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchNode")
            .field("id", &self.id)
            .field("purpose", &self.purpose)
            .field("owned", &self.keys.is_some())
            .finish()
    }
}

/// Nodes from a root down to some subfeed.
pub type Branch = Vec<BranchNode>;

/// A subfeed and everything below it.
#[derive(Debug, Clone)]
pub struct Tree {
    pub node: BranchNode,
    pub children: Vec<Tree>,
}

impl Tree {
    /// Assemble the tree rooted at `root` from `branches`.
    ///
    /// Branches that start elsewhere are ignored. Children keep the order in
    /// which they first appear. Returns `None` if no branch starts at `root`.
    pub fn build(root: &FeedId, branches: &[Branch]) -> Option<Tree> {
        let paths: Vec<&[BranchNode]> = branches
            .iter()
            .map(Vec::as_slice)
            .filter(|b| b.first().is_some_and(|n| &n.id == root))
            .collect();

        let first = paths.first()?;
        Some(build_node(&first[0], &paths))
    }

    pub fn id(&self) -> &FeedId {
        &self.node.id
    }

    pub fn purpose(&self) -> &str {
        &self.node.purpose
    }

    /// The leaf with the given purpose under `root / v1 / <shard>`.
    ///
    /// Only the first child of the root is considered, and only if it is the
    /// v1 node.
    pub fn find_leaf(&self, purpose: &str) -> Option<&Tree> {
        let v1 = self.children.first()?;
        if v1.purpose() != V1_PURPOSE {
            return None;
        }
        v1.children
            .iter()
            .flat_map(|shard| shard.children.iter())
            .find(|leaf| leaf.purpose() == purpose)
    }
}

/// `paths` all start at `node`.
fn build_node(node: &BranchNode, paths: &[&[BranchNode]]) -> Tree {
    let mut groups: Vec<(&BranchNode, Vec<&[BranchNode]>)> = Vec::new();

    for &path in paths {
        let Some(child) = path.get(1) else { continue };
        let pos = groups.iter().position(|(c, _)| c.id == child.id);
        match pos {
            Some(i) => groups[i].1.push(&path[1..]),
            None => groups.push((child, vec![&path[1..]])),
        }
    }

    Tree {
        node: node.clone(),
        children: groups
            .into_iter()
            .map(|(child, sub)| build_node(child, &sub))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(b: u8) -> FeedId {
        FeedId::from_bytes([b; 32])
    }

    fn node(b: u8, purpose: &str) -> BranchNode {
        BranchNode::foreign(feed(b), purpose)
    }

    fn sample() -> Vec<Branch> {
        vec![
            vec![node(1, "root")],
            vec![node(1, "root"), node(2, "v1")],
            vec![node(1, "root"), node(2, "v1"), node(3, "a")],
            vec![node(1, "root"), node(2, "v1"), node(3, "a"), node(4, "chess")],
            vec![node(1, "root"), node(2, "v1"), node(5, "b")],
            vec![node(1, "root"), node(2, "v1"), node(5, "b"), node(6, "dm")],
            vec![node(9, "root"), node(10, "v1")],
        ]
    }

    #[test]
    fn test_build_groups_by_node() {
        let tree = Tree::build(&feed(1), &sample()).unwrap();
        assert_eq!(tree.purpose(), "root");
        assert_eq!(tree.children.len(), 1);

        let v1 = &tree.children[0];
        let shards: Vec<_> = v1.children.iter().map(|s| s.purpose().to_string()).collect();
        assert_eq!(shards, vec!["a", "b"]);
        assert_eq!(v1.children[0].children[0].id(), &feed(4));
    }

    #[test]
    fn test_build_unknown_root() {
        assert!(Tree::build(&feed(42), &sample()).is_none());
    }

    #[test]
    fn test_find_leaf() {
        let tree = Tree::build(&feed(1), &sample()).unwrap();
        assert_eq!(tree.find_leaf("dm").unwrap().id(), &feed(6));
        assert!(tree.find_leaf("missing").is_none());
    }

    #[test]
    fn test_find_leaf_requires_v1_first() {
        let branches = vec![
            vec![node(1, "root"), node(2, "v2"), node(3, "a"), node(4, "dm")],
            vec![node(1, "root"), node(5, "v1"), node(6, "a"), node(7, "dm")],
        ];
        let tree = Tree::build(&feed(1), &branches).unwrap();
        assert!(tree.find_leaf("dm").is_none());
    }
}
