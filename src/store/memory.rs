//! In-Memory Accessor
//!
//! [`MemStore`] keeps recently touched nodes resident as live values and
//! everything else as encoded bytes, reviving through the type descriptor's
//! codec on demand. All mutation is staged: nothing reaches the encoded
//! layer until [`Accessor::commit`], and [`Accessor::discard`] rolls the
//! store back to its last committed state.

use std::collections::HashMap;
use std::collections::HashSet;

use anyhow::Result;
use thiserror::Error;

use super::sparse::BuildIdentityHasher;
use super::Accessor;
use super::NodeId;
use crate::btree::node::Node;
use crate::btree::types::TreeType;

/// MemStore errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The id does not name a live node.
    #[error("no node stored under id {0}")]
    LostNode(NodeId),
}

#[derive(Clone, Debug)]
struct Active<K, V> {
    node: Node<K, V>,
    dirty: bool,
}

/// Memory-backed node storage over a [`TreeType`] codec.
#[derive(Debug)]
pub struct MemStore<T: TreeType> {
    ty: T,
    active: HashMap<NodeId, Active<T::Key, T::Value>, BuildIdentityHasher>,
    persisted: HashMap<NodeId, Vec<u8>, BuildIdentityHasher>,
    doomed: HashSet<NodeId, BuildIdentityHasher>,
    next: NodeId,
}

impl<T: TreeType> MemStore<T> {
    /// Create an empty store using `ty` as its node codec.
    pub fn new(ty: T) -> Self {
        Self {
            ty,
            active: HashMap::default(),
            persisted: HashMap::default(),
            doomed: HashSet::default(),
            // 0 is the wire sentinel for "no child"
            next: 1,
        }
    }

    /// Encoded bytes of a committed node, if present.
    pub fn persisted(&self, id: NodeId) -> Option<&[u8]> {
        self.persisted.get(&id).map(Vec::as_slice)
    }

    /// Number of uncommitted resident nodes.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    fn live(&self, id: NodeId) -> bool {
        self.active.contains_key(&id) || (self.persisted.contains_key(&id) && !self.doomed.contains(&id))
    }
}

impl<T: TreeType> Accessor<T::Key, T::Value> for MemStore<T> {
    fn select(&mut self, id: NodeId) -> Result<Node<T::Key, T::Value>> {
        if let Some(active) = self.active.get(&id) {
            return Ok(active.node.clone());
        }
        if self.doomed.contains(&id) {
            return Err(StoreError::LostNode(id).into());
        }
        let data = self.persisted.get(&id).ok_or(StoreError::LostNode(id))?;
        let node = self.ty.deserialize(data)?;
        self.active.insert(
            id,
            Active {
                node: node.clone(),
                dirty: false,
            },
        );
        Ok(node)
    }

    fn insert(&mut self, node: Node<T::Key, T::Value>) -> Result<NodeId> {
        let id = self.next;
        self.next += 1;
        self.active.insert(id, Active { node, dirty: true });
        Ok(id)
    }

    fn update(&mut self, id: NodeId, node: Node<T::Key, T::Value>) -> Result<()> {
        if !self.live(id) {
            return Err(StoreError::LostNode(id).into());
        }
        self.active.insert(id, Active { node, dirty: true });
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<()> {
        let was_active = self.active.remove(&id).is_some();
        if self.persisted.contains_key(&id) && !self.doomed.contains(&id) {
            self.doomed.insert(id);
        } else if !was_active {
            return Err(StoreError::LostNode(id).into());
        }
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self
            .persisted
            .keys()
            .filter(|id| !self.doomed.contains(id))
            .chain(self.active.keys())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn commit(&mut self) -> Result<()> {
        for id in self.doomed.drain() {
            self.persisted.remove(&id);
        }
        for (id, active) in self.active.drain() {
            if active.dirty {
                let data = self.ty.serialize(&active.node)?;
                self.persisted.insert(id, data);
            }
        }
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.active.clear();
        self.doomed.clear();
        Ok(())
    }
}
