//! Key Iteration
//!
//! In-order traversal over a tree, in either direction. The iterator
//! holds the tree mutably because visiting a node may revive it through
//! the accessor. Storage failures surface as `Err` items and traversal
//! stops at the first one.

use anyhow::Result;

use super::node::Node;
use super::tree::Direction;
use super::tree::Tree;
use super::tree::TreeKey;
use super::tree::TreeValue;
use super::types::TreeType;
use crate::store::Accessor;
use crate::store::NodeId;

struct Frame<K, V>
where
    K: TreeKey,
    V: TreeValue,
{
    node: Node<K, V>,
    cursor: usize,
}

/// Iterator over a tree's keys. Created by [`Tree::keys`].
pub struct Keys<'a, T, A>
where
    T: TreeType,
    A: Accessor<T::Key, T::Value>,
{
    tree: &'a mut Tree<T, A>,
    direction: Direction,
    stack: Vec<Frame<T::Key, T::Value>>,
    seeded: bool,
}

impl<'a, T, A> Keys<'a, T, A>
where
    T: TreeType,
    A: Accessor<T::Key, T::Value>,
{
    pub(crate) fn new(tree: &'a mut Tree<T, A>, direction: Direction) -> Self {
        Self {
            tree,
            direction,
            stack: Vec::new(),
            seeded: false,
        }
    }

    // Push frames from `id` down to the first leaf in iteration order.
    fn descend(&mut self, mut id: NodeId) -> Result<()> {
        loop {
            let node = self.tree.load(id)?;
            let cursor = match self.direction {
                Direction::Ascending => 0,
                Direction::Descending => node.len(),
            };
            let next = node.child(cursor);
            self.stack.push(Frame { node, cursor });
            match next {
                Some(child) => id = child,
                None => return Ok(()),
            }
        }
    }
}

impl<T, A> Iterator for Keys<'_, T, A>
where
    T: TreeType,
    A: Accessor<T::Key, T::Value>,
{
    type Item = Result<T::Key>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.seeded {
            self.seeded = true;
            let root = self.tree.root();
            if let Err(err) = self.descend(root) {
                self.stack.clear();
                return Some(Err(err));
            }
        }
        loop {
            let step = {
                let frame = self.stack.last_mut()?;
                match self.direction {
                    Direction::Ascending if frame.cursor < frame.node.len() => {
                        let key = frame.node.key(frame.cursor).clone();
                        frame.cursor += 1;
                        Some((key, frame.node.child(frame.cursor)))
                    }
                    Direction::Descending if frame.cursor > 0 => {
                        frame.cursor -= 1;
                        let key = frame.node.key(frame.cursor).clone();
                        Some((key, frame.node.child(frame.cursor)))
                    }
                    _ => None,
                }
            };
            match step {
                Some((key, child)) => {
                    if let Some(child) = child {
                        if let Err(err) = self.descend(child) {
                            self.stack.clear();
                            return Some(Err(err));
                        }
                    }
                    return Some(Ok(key));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
