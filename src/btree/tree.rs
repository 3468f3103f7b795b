//! Tree Engine
//!
//! An order-preserving B-tree whose nodes live behind an [`Accessor`].
//! The tree clones nodes out of the accessor, rewrites them, and pushes
//! them back, so the engine itself owns nothing but a root id, a height
//! and a length. Mutations stage in the accessor until [`Tree::commit`];
//! [`Tree::discard`] rolls both the accessor and the tree header back to
//! the last committed state.

use std::cmp::Ordering;
use std::fmt::Debug;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use super::iter::Keys;
use super::node::Node;
use super::types::TreeType;
use crate::store::Accessor;
use crate::store::NodeId;

/// Behaviour required of tree keys.
pub trait TreeKey: Clone + Debug + DeserializeOwned + Serialize + 'static {}

impl<T> TreeKey for T where T: Clone + Debug + DeserializeOwned + Serialize + 'static {}

/// Behaviour required of tree values.
pub trait TreeValue: Clone + Debug + DeserializeOwned + Serialize + 'static {}

impl<T> TreeValue for T where T: Clone + Debug + DeserializeOwned + Serialize + 'static {}

/// Tree errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The requested branching factor cannot hold a split.
    #[error("branching factor {0} is too small, minimum is 2")]
    BranchTooSmall(usize),
    /// The key is already present.
    #[error("key is already present")]
    DuplicateKey,
    /// The key is not present.
    #[error("key not found")]
    NotFound,
    /// A structural invariant does not hold. The tree cannot be trusted.
    #[error("corrupt tree structure: {0}")]
    Corrupt(&'static str),
}

/// Key iteration order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Smallest key first.
    Ascending,
    /// Largest key first.
    Descending,
}

/// Outcome of a key lookup.
///
/// Set descriptors carry no values, so a hit reports [`Search::Found`];
/// map descriptors report [`Search::FoundValue`] with the stored value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Search<V> {
    /// The key is not in the tree.
    NotFound,
    /// The key is in the tree (set semantics, no value stored).
    Found,
    /// The key is in the tree with this value.
    FoundValue(V),
}

/// One level of a root-to-node descent. `pos` is the key match or the
/// child index taken within `node`, so a step's `pos` names which child
/// the next step occupies.
pub(crate) struct PathStep<K, V>
where
    K: TreeKey,
    V: TreeValue,
{
    id: NodeId,
    pos: usize,
    node: Node<K, V>,
}

#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    root: NodeId,
    height: usize,
    len: usize,
}

/// B-tree over a type descriptor `T` and node storage `A`.
pub struct Tree<T, A>
where
    T: TreeType,
    A: Accessor<T::Key, T::Value>,
{
    ty: T,
    store: A,
    root: NodeId,
    height: usize,
    len: usize,
    max_size: usize,
    checkpoint: Checkpoint,
}

impl<T, A> Tree<T, A>
where
    T: TreeType,
    A: Accessor<T::Key, T::Value>,
{
    /// Create an empty tree with at most `max_size` keys per node.
    ///
    /// The empty root leaf is committed immediately so that a later
    /// [`Tree::discard`] always has a state to fall back to.
    pub fn new(ty: T, mut store: A, max_size: usize) -> Result<Self> {
        if max_size < 2 {
            return Err(TreeError::BranchTooSmall(max_size).into());
        }
        let root = store.insert(Node::leaf(ty.has_values()))?;
        store.commit()?;
        info!(root, max_size, "created tree");
        Ok(Self {
            ty,
            store,
            root,
            height: 1,
            len: 0,
            max_size,
            checkpoint: Checkpoint {
                root,
                height: 1,
                len: 0,
            },
        })
    }

    /// Adopt an existing tree from its stored header fields.
    pub fn attach(
        ty: T,
        store: A,
        root: NodeId,
        height: usize,
        len: usize,
        max_size: usize,
    ) -> Result<Self> {
        if max_size < 2 {
            return Err(TreeError::BranchTooSmall(max_size).into());
        }
        info!(root, height, len, "attached tree");
        Ok(Self {
            ty,
            store,
            root,
            height,
            len,
            max_size,
            checkpoint: Checkpoint { root, height, len },
        })
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Levels between the root and the leaves, inclusive.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Storage id of the current root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Maximum number of keys a node may hold.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Look a key up.
    pub fn find(&mut self, key: &T::Key) -> Result<Search<T::Value>> {
        let (path, found) = self.find_path(key)?;
        if !found {
            return Ok(Search::NotFound);
        }
        let step = path.last().ok_or(TreeError::Corrupt("empty search path"))?;
        match step.node.values() {
            Some(values) => Ok(Search::FoundValue(values[step.pos].clone())),
            None => Ok(Search::Found),
        }
    }

    /// The value stored under `key`, if any. On set trees this is always
    /// `None`; use [`Tree::contains`] there.
    pub fn get(&mut self, key: &T::Key) -> Result<Option<T::Value>> {
        match self.find(key)? {
            Search::FoundValue(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// True when `key` is in the tree.
    pub fn contains(&mut self, key: &T::Key) -> Result<bool> {
        Ok(!matches!(self.find(key)?, Search::NotFound))
    }

    /// Insert a key. Duplicate keys are rejected with
    /// [`TreeError::DuplicateKey`]. Set trees pass `()` as the value.
    pub fn insert(&mut self, key: T::Key, value: T::Value) -> Result<()> {
        let (mut path, found) = self.find_path(&key)?;
        if found {
            return Err(TreeError::DuplicateKey.into());
        }
        let mut step = path.pop().ok_or(TreeError::Corrupt("empty search path"))?;
        step.node
            .insert_entry(step.pos, key, self.ty.has_values().then_some(value), None);

        // Split upward until a node absorbs the promoted key.
        let mut carry = None;
        loop {
            if step.node.len() <= self.max_size {
                self.store.update(step.id, step.node)?;
                break;
            }
            let mid = self.max_size / 2;
            let (up_key, up_value, right) = step.node.split(mid);
            let right_id = self.store.insert(right)?;
            self.store.update(step.id, step.node)?;
            match path.pop() {
                Some(parent) => {
                    step = parent;
                    step.node
                        .insert_entry(step.pos, up_key, up_value, Some(right_id));
                }
                None => {
                    carry = Some((up_key, up_value, right_id));
                    break;
                }
            }
        }

        if let Some((up_key, up_value, right_id)) = carry {
            let root = Node::root(up_key, up_value, self.root, right_id);
            self.root = self.store.insert(root)?;
            self.height += 1;
            debug!(root = self.root, height = self.height, "root grew");
        }
        self.len += 1;
        Ok(())
    }

    /// Remove a key, returning its stored value (`None` on set trees).
    /// An absent key is rejected with [`TreeError::NotFound`] and leaves
    /// the tree untouched.
    pub fn remove(&mut self, key: &T::Key) -> Result<Option<T::Value>> {
        let (mut path, found) = self.find_path(key)?;
        if !found {
            return Err(TreeError::NotFound.into());
        }

        let removed;
        let target = path.len() - 1;
        if path[target].node.is_leaf() {
            let pos = path[target].pos;
            removed = path[target].node.remove_entry(pos).1;
            self.store.update(path[target].id, path[target].node.clone())?;
        } else {
            // Swap the key with its in-order predecessor, the rightmost key
            // in the subtree left of the separator, then remove at the leaf.
            let pos = path[target].pos;
            let mut id = path[target]
                .node
                .child(pos)
                .ok_or(TreeError::Corrupt("missing child pointer"))?;
            for depth in path.len() + 1..=self.height {
                let node = self.store.select(id)?;
                if node.is_leaf() && depth < self.height {
                    return Err(TreeError::Corrupt("leaf above expected depth").into());
                }
                if !node.is_leaf() && depth == self.height {
                    return Err(TreeError::Corrupt("internal node at leaf depth").into());
                }
                let pos = node.len();
                let child = node.child(pos);
                if child.is_none() && depth < self.height {
                    return Err(TreeError::Corrupt("missing child pointer").into());
                }
                path.push(PathStep { id, pos, node });
                match child {
                    Some(next) => id = next,
                    None => break,
                }
            }

            let leaf = path.len() - 1;
            if path[leaf].node.is_empty() {
                return Err(TreeError::Corrupt("empty leaf during predecessor swap").into());
            }
            let last = path[leaf].node.len() - 1;
            let (pred_key, pred_value) = path[leaf].node.remove_entry(last);
            self.store.update(path[leaf].id, path[leaf].node.clone())?;
            let step = &mut path[target];
            removed = step.node.replace_entry(step.pos, pred_key, pred_value).1;
            self.store.update(step.id, step.node.clone())?;
        }

        self.rebalance(path)?;
        self.len -= 1;
        Ok(removed)
    }

    /// Restore minimum occupancy from the tail of `path` upward, by
    /// rotation where a sibling can spare a key and by merge otherwise.
    fn rebalance(&mut self, mut path: Vec<PathStep<T::Key, T::Value>>) -> Result<()> {
        let min_size = self.max_size / 2;
        let mut level = path.len() - 1;
        while level > 0 && path[level].node.len() < min_size {
            let (upper, lower) = path.split_at_mut(level);
            let parent = &mut upper[level - 1];
            let step = &mut lower[0];
            let pos = parent.pos;
            if parent.node.is_empty() {
                return Err(TreeError::Corrupt("empty parent during rebalance").into());
            }

            // Rotate from the left sibling when it can spare a key.
            if pos > 0 {
                let left_id = parent
                    .node
                    .child(pos - 1)
                    .ok_or(TreeError::Corrupt("missing sibling"))?;
                let mut left = self.store.select(left_id)?;
                if left.len() > min_size {
                    let (up_key, up_value) = left.remove_entry(left.len() - 1);
                    let spill = left.pop_last_child();
                    let (down_key, down_value) =
                        parent.node.replace_entry(pos - 1, up_key, up_value);
                    step.node.insert_entry(0, down_key, down_value, None);
                    if let Some(child) = spill {
                        step.node.push_first_child(child);
                    }
                    self.store.update(left_id, left)?;
                    self.store.update(step.id, step.node.clone())?;
                    self.store.update(parent.id, parent.node.clone())?;
                    return Ok(());
                }
            }

            // Then from the right sibling. The separator being replaced sits
            // at its true index `pos`.
            if pos < parent.node.len() {
                let right_id = parent
                    .node
                    .child(pos + 1)
                    .ok_or(TreeError::Corrupt("missing sibling"))?;
                let mut right = self.store.select(right_id)?;
                if right.len() > min_size {
                    let (up_key, up_value) = right.remove_entry(0);
                    let spill = right.pop_first_child();
                    let (down_key, down_value) = parent.node.replace_entry(pos, up_key, up_value);
                    let end = step.node.len();
                    step.node.insert_entry(end, down_key, down_value, None);
                    if let Some(child) = spill {
                        step.node.push_last_child(child);
                    }
                    self.store.update(right_id, right)?;
                    self.store.update(step.id, step.node.clone())?;
                    self.store.update(parent.id, parent.node.clone())?;
                    return Ok(());
                }
            }

            // No sibling can spare a key, so merge through the separator.
            // The left sibling absorbs when one exists.
            if pos > 0 {
                let left_id = parent
                    .node
                    .child(pos - 1)
                    .ok_or(TreeError::Corrupt("missing sibling"))?;
                let mut left = self.store.select(left_id)?;
                let (sep_key, sep_value) = parent.node.remove_entry(pos - 1);
                parent.node.remove_child(pos);
                left.merge_from_right(sep_key, sep_value, step.node.clone());
                self.store.update(left_id, left)?;
                self.store.remove(step.id)?;
            } else {
                let right_id = parent
                    .node
                    .child(pos + 1)
                    .ok_or(TreeError::Corrupt("missing sibling"))?;
                let right = self.store.select(right_id)?;
                let (sep_key, sep_value) = parent.node.remove_entry(pos);
                parent.node.remove_child(pos + 1);
                step.node.merge_from_right(sep_key, sep_value, right);
                self.store.update(step.id, step.node.clone())?;
                self.store.remove(right_id)?;
            }
            self.store.update(parent.id, parent.node.clone())?;
            level -= 1;
        }

        // A root emptied by merging promotes its sole child.
        if self.height > 1 && path[0].node.is_empty() {
            let child = path[0]
                .node
                .child(0)
                .ok_or(TreeError::Corrupt("missing child pointer"))?;
            self.store.remove(path[0].id)?;
            self.root = child;
            self.height -= 1;
            debug!(root = self.root, height = self.height, "root collapsed");
        }
        Ok(())
    }

    /// Iterate keys in `direction` order. Storage failures surface as
    /// `Err` items.
    pub fn keys(&mut self, direction: Direction) -> Keys<'_, T, A> {
        Keys::new(self, direction)
    }

    /// All keys, ascending.
    pub fn flatten(&mut self) -> Result<Vec<T::Key>> {
        self.keys(Direction::Ascending).collect()
    }

    /// Check every structural invariant: node occupancy, uniform leaf
    /// depth, value shape, key ordering, length bookkeeping and that the
    /// accessor holds exactly the reachable nodes.
    pub fn validate(&mut self) -> Result<()> {
        let min_size = self.max_size / 2;
        let mut visited = Vec::new();
        let mut total = 0;
        let mut pending = vec![(self.root, 1usize)];
        while let Some((id, depth)) = pending.pop() {
            let node = self.store.select(id)?;
            visited.push(id);
            total += node.len();
            if node.len() > self.max_size {
                return Err(TreeError::Corrupt("node above maximum occupancy").into());
            }
            if depth > 1 && node.len() < min_size {
                return Err(TreeError::Corrupt("node below minimum occupancy").into());
            }
            if depth == 1 && node.is_empty() && self.height > 1 {
                return Err(TreeError::Corrupt("empty root above a leaf").into());
            }
            if self.ty.has_values() != node.values().is_some() {
                return Err(TreeError::Corrupt("node value shape does not match type").into());
            }
            if depth == self.height {
                if !node.is_leaf() {
                    return Err(TreeError::Corrupt("internal node at leaf depth").into());
                }
            } else {
                if node.is_leaf() {
                    return Err(TreeError::Corrupt("leaf above expected depth").into());
                }
                for pos in 0..=node.len() {
                    let child = node
                        .child(pos)
                        .ok_or(TreeError::Corrupt("missing child pointer"))?;
                    pending.push((child, depth + 1));
                }
            }
        }

        if total != self.len {
            return Err(TreeError::Corrupt("length does not match key count").into());
        }

        let keys = self.flatten()?;
        for pair in keys.windows(2) {
            if self.ty.compare(&pair[0], &pair[1]) != Ordering::Less {
                return Err(TreeError::Corrupt("keys out of order").into());
            }
        }

        let mut stored = self.store.list()?;
        stored.sort_unstable();
        visited.sort_unstable();
        if stored != visited {
            return Err(TreeError::Corrupt("stored nodes do not match reachable nodes").into());
        }
        Ok(())
    }

    /// Dump the tree to stdout, one key per line, prefixed with one `=`
    /// per level of depth.
    pub fn print(&mut self) -> Result<()> {
        self.print_node(self.root, 1)
    }

    fn print_node(&mut self, id: NodeId, depth: usize) -> Result<()> {
        let node = self.store.select(id)?;
        let pad = "=".repeat(depth);
        for pos in 0..node.len() {
            if let Some(child) = node.child(pos) {
                self.print_node(child, depth + 1)?;
            }
            println!("{pad} {}", self.ty.format(node.key(pos)));
        }
        if let Some(child) = node.child(node.len()) {
            self.print_node(child, depth + 1)?;
        }
        Ok(())
    }

    /// Fraction of node capacity in use across the whole tree.
    pub fn utilization(&mut self) -> Result<f64> {
        let nodes = self.store.list()?.len();
        if nodes == 0 {
            return Ok(0.0);
        }
        Ok(self.len as f64 / (nodes * self.max_size) as f64)
    }

    /// Log the tree header fields.
    pub fn info(&self) {
        info!(
            root = self.root,
            height = self.height,
            len = self.len,
            max_size = self.max_size,
            "tree"
        );
    }

    /// Make all staged changes durable.
    pub fn commit(&mut self) -> Result<()> {
        self.store.commit()?;
        self.checkpoint = Checkpoint {
            root: self.root,
            height: self.height,
            len: self.len,
        };
        debug!(root = self.root, len = self.len, "committed");
        Ok(())
    }

    /// Abandon all changes since the last commit, restoring both the
    /// stored nodes and the tree header.
    pub fn discard(&mut self) -> Result<()> {
        self.store.discard()?;
        self.root = self.checkpoint.root;
        self.height = self.checkpoint.height;
        self.len = self.checkpoint.len;
        debug!(root = self.root, len = self.len, "discarded");
        Ok(())
    }

    /// Remove every key, leaving a fresh empty root leaf. Staged like any
    /// other mutation.
    pub fn clear(&mut self) -> Result<()> {
        for id in self.store.list()? {
            self.store.remove(id)?;
        }
        self.root = self.store.insert(Node::leaf(self.ty.has_values()))?;
        self.height = 1;
        self.len = 0;
        Ok(())
    }

    /// Descend from the root towards `key`, recording every node touched.
    /// When the second element is true the key was found and the last
    /// step's `pos` marks it; otherwise the last step is the leaf where
    /// the key would insert at `pos`.
    fn find_path(&mut self, key: &T::Key) -> Result<(Vec<PathStep<T::Key, T::Value>>, bool)> {
        let mut path = Vec::with_capacity(self.height);
        let mut id = self.root;
        for depth in 1..=self.height {
            let node = self.store.select(id)?;
            if node.is_leaf() && depth < self.height {
                return Err(TreeError::Corrupt("leaf above expected depth").into());
            }
            if !node.is_leaf() && depth == self.height {
                return Err(TreeError::Corrupt("internal node at leaf depth").into());
            }
            match node
                .keys()
                .binary_search_by(|probe| self.ty.compare(probe, key))
            {
                Ok(pos) => {
                    path.push(PathStep { id, pos, node });
                    return Ok((path, true));
                }
                Err(pos) => {
                    let child = node.child(pos);
                    path.push(PathStep { id, pos, node });
                    match child {
                        Some(next) => id = next,
                        None => return Ok((path, false)),
                    }
                }
            }
        }
        Err(TreeError::Corrupt("search descended past the leaf depth").into())
    }

    pub(crate) fn load(&mut self, id: NodeId) -> Result<Node<T::Key, T::Value>> {
        self.store.select(id)
    }
}

#[cfg(test)]
mod tests;
