//! B-tree Node Model

use serde::{Deserialize, Serialize};

use super::tree::TreeKey;
use super::tree::TreeValue;
use crate::store::NodeId;

/// A single B-tree node.
///
/// Nodes are created by the tree engine (or by a descriptor's deserializer)
/// and handed to an accessor to obtain or refresh an identifier. `values` is
/// present iff the tree's type descriptor declares value semantics; `children`
/// is present iff the node is internal, and then always holds exactly one
/// more entry than `keys`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node<K, V> {
    keys: Vec<K>,
    values: Option<Vec<V>>,
    children: Option<Vec<NodeId>>,
}

impl<K, V> Node<K, V>
where
    K: TreeKey,
    V: TreeValue,
{
    pub(crate) fn leaf(has_values: bool) -> Self {
        Node {
            keys: Vec::new(),
            values: has_values.then(Vec::new),
            children: None,
        }
    }

    /// Assemble a node from its raw parts.
    ///
    /// Intended for descriptor deserializers; the engine never builds nodes
    /// this way. `children`, when present, must hold `keys.len() + 1` entries.
    pub fn from_parts(keys: Vec<K>, values: Option<Vec<V>>, children: Option<Vec<NodeId>>) -> Self {
        debug_assert!(values.as_ref().map_or(true, |v| v.len() == keys.len()));
        debug_assert!(children
            .as_ref()
            .map_or(true, |c| c.len() == keys.len() + 1));
        Node {
            keys,
            values,
            children,
        }
    }

    // A freshly grown root holding a single promoted key and two children.
    pub(crate) fn root(key: K, value: Option<V>, left: NodeId, right: NodeId) -> Self {
        Node {
            keys: vec![key],
            values: value.map(|v| vec![v]),
            children: Some(vec![left, right]),
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the node holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True when the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// The ordered key sequence.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// The value sequence, present only in map mode.
    pub fn values(&self) -> Option<&[V]> {
        self.values.as_deref()
    }

    /// The child identifiers, present only on internal nodes.
    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    pub(crate) fn key(&self, pos: usize) -> &K {
        &self.keys[pos]
    }

    /// Child identifier at `pos`, or `None` on a leaf (or out of range).
    pub(crate) fn child(&self, pos: usize) -> Option<NodeId> {
        self.children.as_ref().and_then(|c| c.get(pos)).copied()
    }

    /// Insert a key (and value, and the right-hand child produced by a lower
    /// level split) at `pos`, shifting the remainder right by one slot.
    pub(crate) fn insert_entry(
        &mut self,
        pos: usize,
        key: K,
        value: Option<V>,
        right_child: Option<NodeId>,
    ) {
        self.keys.insert(pos, key);
        if let (Some(values), Some(value)) = (self.values.as_mut(), value) {
            values.insert(pos, value);
        }
        if let Some(child) = right_child {
            match self.children.as_mut() {
                Some(children) => children.insert(pos + 1, child),
                None => panic!("Leaf nodes do not contain children"),
            }
        }
    }

    /// Remove the key/value pair at `pos`. Child pointers are untouched.
    pub(crate) fn remove_entry(&mut self, pos: usize) -> (K, Option<V>) {
        let key = self.keys.remove(pos);
        let value = self.values.as_mut().map(|values| values.remove(pos));
        (key, value)
    }

    /// Replace the key/value pair at `pos`, returning the previous pair.
    pub(crate) fn replace_entry(&mut self, pos: usize, key: K, value: Option<V>) -> (K, Option<V>) {
        let old_key = std::mem::replace(&mut self.keys[pos], key);
        let old_value = match (self.values.as_mut(), value) {
            (Some(values), Some(value)) => Some(std::mem::replace(&mut values[pos], value)),
            _ => None,
        };
        (old_key, old_value)
    }

    pub(crate) fn remove_child(&mut self, pos: usize) -> NodeId {
        match self.children.as_mut() {
            Some(children) => children.remove(pos),
            None => panic!("Leaf nodes do not contain children"),
        }
    }

    pub(crate) fn pop_first_child(&mut self) -> Option<NodeId> {
        self.children.as_mut().map(|children| children.remove(0))
    }

    pub(crate) fn pop_last_child(&mut self) -> Option<NodeId> {
        self.children.as_mut().and_then(|children| children.pop())
    }

    pub(crate) fn push_first_child(&mut self, child: NodeId) {
        match self.children.as_mut() {
            Some(children) => children.insert(0, child),
            None => panic!("Leaf nodes do not contain children"),
        }
    }

    pub(crate) fn push_last_child(&mut self, child: NodeId) {
        match self.children.as_mut() {
            Some(children) => children.push(child),
            None => panic!("Leaf nodes do not contain children"),
        }
    }

    /// Split around the fixed middle index `mid`, leaving everything below it
    /// in place and returning the promoted key/value plus the new right node.
    pub(crate) fn split(&mut self, mid: usize) -> (K, Option<V>, Node<K, V>) {
        let keys = self.keys.split_off(mid + 1);
        let mid_key = self.keys.pop().expect("split point is inside the node");
        let (mid_value, values) = match self.values.as_mut() {
            Some(existing) => {
                let right = existing.split_off(mid + 1);
                (existing.pop(), Some(right))
            }
            None => (None, None),
        };
        let children = self.children.as_mut().map(|c| c.split_off(mid + 1));
        tracing::debug!(
            left = self.keys.len(),
            right = keys.len(),
            "split node at fixed middle"
        );
        (
            mid_key,
            mid_value,
            Node {
                keys,
                values,
                children,
            },
        )
    }

    /// Absorb the parent separator and a right-hand sibling, in order.
    pub(crate) fn merge_from_right(&mut self, key: K, value: Option<V>, right: Node<K, V>) {
        self.keys.push(key);
        self.keys.extend(right.keys);
        if let Some(values) = self.values.as_mut() {
            if let Some(value) = value {
                values.push(value);
            }
            if let Some(right_values) = right.values {
                values.extend(right_values);
            }
        }
        if let (Some(children), Some(right_children)) = (self.children.as_mut(), right.children) {
            children.extend(right_children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: &[i64]) -> Node<i64, i64> {
        Node::from_parts(
            keys.to_vec(),
            Some(keys.iter().map(|k| k * 10).collect()),
            None,
        )
    }

    #[test]
    fn it_inserts_entries_in_position() {
        let mut node = leaf_with(&[1, 3]);
        node.insert_entry(1, 2, Some(20), None);
        assert_eq!(node.keys(), &[1, 2, 3]);
        assert_eq!(node.values(), Some(&[10, 20, 30][..]));
    }

    #[test]
    fn it_splits_at_the_fixed_middle() {
        let mut node: Node<i64, i64> = Node::from_parts(
            vec![1, 2, 3, 4, 5],
            None,
            Some(vec![10, 11, 12, 13, 14, 15]),
        );
        // max_size 4, so the promoted key sits at index 2
        let (mid, _value, right) = node.split(2);
        assert_eq!(mid, 3);
        assert_eq!(node.keys(), &[1, 2]);
        assert_eq!(node.children(), Some(&[10, 11, 12][..]));
        assert_eq!(right.keys(), &[4, 5]);
        assert_eq!(right.children(), Some(&[13, 14, 15][..]));
    }

    #[test]
    fn it_merges_a_right_sibling_through_the_separator() {
        let mut node = leaf_with(&[1, 2]);
        let right = leaf_with(&[4, 5]);
        node.merge_from_right(3, Some(30), right);
        assert_eq!(node.keys(), &[1, 2, 3, 4, 5]);
        assert_eq!(node.values(), Some(&[10, 20, 30, 40, 50][..]));
    }

    #[test]
    fn it_rotates_children_across_edges() {
        let mut node: Node<i64, i64> =
            Node::from_parts(vec![5], None, Some(vec![50, 51]));
        node.push_first_child(49);
        assert_eq!(node.children(), Some(&[49, 50, 51][..]));
        assert_eq!(node.pop_last_child(), Some(51));
        assert_eq!(node.pop_first_child(), Some(49));
    }

    #[test]
    #[should_panic]
    fn it_wont_hold_children_in_a_leaf() {
        let mut node = leaf_with(&[1]);
        node.push_last_child(9);
    }
}
