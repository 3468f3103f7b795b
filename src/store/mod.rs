//! Node Storage
//!
//! Trees never hold their nodes directly. Every node lives behind an
//! [`Accessor`], addressed by a [`NodeId`], and the tree clones nodes out of
//! the accessor to read or rewrite them. Mutations accumulate in the
//! accessor until [`Accessor::commit`] makes them durable or
//! [`Accessor::discard`] throws them away.

use anyhow::Result;

use crate::btree::node::Node;
use crate::btree::TreeKey;
use crate::btree::TreeValue;

pub mod memory;
mod sparse;

pub use memory::MemStore;

/// Identifies a stored node. 0 is reserved to mean "no child" on the wire,
/// so accessors never allocate it.
pub type NodeId = u64;

/// Storage contract for tree nodes.
///
/// Identifier allocation belongs to the accessor: [`Accessor::insert`]
/// chooses the id and hands it back. The tree only ever presents ids it was
/// previously given, so a missing id is data corruption, not a soft miss.
pub trait Accessor<K, V>
where
    K: TreeKey,
    V: TreeValue,
{
    /// Retrieve a copy of the node stored under `id`.
    fn select(&mut self, id: NodeId) -> Result<Node<K, V>>;

    /// Store a new node, allocating and returning its id.
    fn insert(&mut self, node: Node<K, V>) -> Result<NodeId>;

    /// Replace the node stored under `id`.
    fn update(&mut self, id: NodeId, node: Node<K, V>) -> Result<()>;

    /// Remove the node stored under `id`.
    fn remove(&mut self, id: NodeId) -> Result<()>;

    /// Ids of every live node, in no particular order.
    fn list(&mut self) -> Result<Vec<NodeId>>;

    /// Make all accumulated changes durable.
    fn commit(&mut self) -> Result<()>;

    /// Abandon all changes made since the last commit.
    fn discard(&mut self) -> Result<()>;
}
