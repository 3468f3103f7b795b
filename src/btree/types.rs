//! Type Descriptors
//!
//! A [`TreeType`] bundles everything the engine needs to know about a key
//! (and value) encoding: comparison, formatting and the node wire codec.
//! Descriptors are plain immutable values, supplied once at tree creation.

use std::cmp::Ordering;
use std::marker::PhantomData;

use anyhow::anyhow;
use anyhow::Error;
use anyhow::Result;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::node::Node;
use super::tree::TreeKey;
use super::tree::TreeValue;
use crate::store::NodeId;
use crate::BINCODER;

/// Capability bundle describing how a tree's keys (and values) behave.
///
/// A value size of 0 selects set semantics: nodes carry no values array and
/// lookups report presence only.
pub trait TreeType {
    /// The key type stored in the tree.
    type Key: TreeKey;
    /// The value type stored alongside keys (unused in set mode).
    type Value: TreeValue;

    /// Size hint for an encoded key, in bytes.
    fn key_size(&self) -> usize;

    /// Size hint for an encoded value, in bytes. 0 means set semantics.
    fn value_size(&self) -> usize;

    /// True when this descriptor declares value semantics.
    fn has_values(&self) -> bool {
        self.value_size() != 0
    }

    /// Three-way comparison between two keys.
    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering;

    /// Upper bound on the encoded size of a node with `max_size` keys.
    ///
    /// Variable-length encodings may return 0 (unknown).
    fn serialized_size(&self, max_size: usize) -> usize;

    /// Encode a node to its wire form.
    fn serialize(&self, node: &Node<Self::Key, Self::Value>) -> Result<Vec<u8>>;

    /// Decode a node from its wire form.
    fn deserialize(&self, data: &[u8]) -> Result<Node<Self::Key, Self::Value>>;

    /// Human readable rendering of a key, for diagnostics only.
    fn format(&self, key: &Self::Key) -> String;
}

fn put_4bytes(data: &mut Vec<u8>, v: i64) -> Result<()> {
    let v = i32::try_from(v).map_err(|_| anyhow!("{v} does not fit the 4-byte wire format"))?;
    data.extend_from_slice(&v.to_be_bytes());
    Ok(())
}

fn put_child(data: &mut Vec<u8>, child: Option<NodeId>) -> Result<()> {
    let id = child.unwrap_or(0);
    let id = u32::try_from(id)
        .map_err(|_| anyhow!("node id {id} does not fit the 4-byte wire format"))?;
    data.extend_from_slice(&id.to_be_bytes());
    Ok(())
}

fn get_4bytes(data: &[u8], pos: usize) -> Result<[u8; 4]> {
    data.get(pos..pos + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| anyhow!("node encoding truncated at byte {pos}"))
}

fn get_key(data: &[u8], pos: usize) -> Result<i64> {
    Ok(i32::from_be_bytes(get_4bytes(data, pos)?) as i64)
}

fn get_child(data: &[u8], pos: usize) -> Result<NodeId> {
    Ok(u32::from_be_bytes(get_4bytes(data, pos)?) as NodeId)
}

/// Reference descriptor: an ordered set of integers.
///
/// Wire form is a 4-byte big-endian occupancy count, then per key a 4-byte
/// big-endian key and a 4-byte big-endian child identifier (0 meaning "no
/// child"), then one trailing 4-byte child identifier. A node is leaf-shaped
/// iff every child slot in its encoding is 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongSet;

impl TreeType for LongSet {
    type Key = i64;
    type Value = ();

    fn key_size(&self) -> usize {
        std::mem::size_of::<i64>()
    }

    fn value_size(&self) -> usize {
        0
    }

    fn compare(&self, a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn serialized_size(&self, max_size: usize) -> usize {
        8 * max_size + 8
    }

    fn serialize(&self, node: &Node<i64, ()>) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(4 + 8 * node.len() + 4);
        put_child(&mut data, Some(node.len() as NodeId))?;
        for (pos, key) in node.keys().iter().enumerate() {
            put_4bytes(&mut data, *key)?;
            put_child(&mut data, node.child(pos))?;
        }
        put_child(&mut data, node.child(node.len()))?;
        Ok(data)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Node<i64, ()>> {
        let size = get_child(data, 0)? as usize;
        let mut keys = Vec::with_capacity(size);
        let mut children = Vec::with_capacity(size + 1);
        let mut any_child = false;
        let mut pos = 4;
        for _ in 0..size {
            keys.push(get_key(data, pos)?);
            let child = get_child(data, pos + 4)?;
            any_child |= child != 0;
            children.push(child);
            pos += 8;
        }
        let child = get_child(data, pos)?;
        any_child |= child != 0;
        children.push(child);
        Ok(Node::from_parts(keys, None, any_child.then_some(children)))
    }

    fn format(&self, key: &i64) -> String {
        key.to_string()
    }
}

/// Reference descriptor: an ordered map from integers to integers.
///
/// Same layout as [`LongSet`] with a 4-byte big-endian value between each
/// key and its child slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongMap;

impl TreeType for LongMap {
    type Key = i64;
    type Value = i64;

    fn key_size(&self) -> usize {
        std::mem::size_of::<i64>()
    }

    fn value_size(&self) -> usize {
        std::mem::size_of::<i64>()
    }

    fn compare(&self, a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn serialized_size(&self, max_size: usize) -> usize {
        12 * max_size + 8
    }

    fn serialize(&self, node: &Node<i64, i64>) -> Result<Vec<u8>> {
        let values = node
            .values()
            .ok_or_else(|| anyhow!("map node is missing its values"))?;
        let mut data = Vec::with_capacity(4 + 12 * node.len() + 4);
        put_child(&mut data, Some(node.len() as NodeId))?;
        for (pos, key) in node.keys().iter().enumerate() {
            put_4bytes(&mut data, *key)?;
            put_4bytes(&mut data, values[pos])?;
            put_child(&mut data, node.child(pos))?;
        }
        put_child(&mut data, node.child(node.len()))?;
        Ok(data)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Node<i64, i64>> {
        let size = get_child(data, 0)? as usize;
        let mut keys = Vec::with_capacity(size);
        let mut values = Vec::with_capacity(size);
        let mut children = Vec::with_capacity(size + 1);
        let mut any_child = false;
        let mut pos = 4;
        for _ in 0..size {
            keys.push(get_key(data, pos)?);
            values.push(get_key(data, pos + 4)?);
            let child = get_child(data, pos + 8)?;
            any_child |= child != 0;
            children.push(child);
            pos += 12;
        }
        let child = get_child(data, pos)?;
        any_child |= child != 0;
        children.push(child);
        Ok(Node::from_parts(
            keys,
            Some(values),
            any_child.then_some(children),
        ))
    }

    fn format(&self, key: &i64) -> String {
        key.to_string()
    }
}

/// Descriptor for arbitrary serde key/value types, encoded whole-node with
/// bincode (fixint, trailing bytes allowed). Keys compare via [`Ord`].
#[derive(Clone, Copy, Debug)]
pub struct BincodeType<K, V> {
    value_size: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BincodeType<K, V> {
    /// Set-mode descriptor: keys only.
    pub fn set() -> Self {
        Self {
            value_size: 0,
            _marker: PhantomData,
        }
    }

    /// Map-mode descriptor with a value size hint in bytes.
    pub fn map(value_size: usize) -> Self {
        assert!(value_size != 0);
        Self {
            value_size,
            _marker: PhantomData,
        }
    }
}

impl<K, V> TreeType for BincodeType<K, V>
where
    K: TreeKey + Ord + Serialize + DeserializeOwned,
    V: TreeValue + Serialize + DeserializeOwned,
{
    type Key = K;
    type Value = V;

    fn key_size(&self) -> usize {
        std::mem::size_of::<K>()
    }

    fn value_size(&self) -> usize {
        self.value_size
    }

    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }

    fn serialized_size(&self, _max_size: usize) -> usize {
        0
    }

    fn serialize(&self, node: &Node<K, V>) -> Result<Vec<u8>> {
        BINCODER.serialize(node).map_err(Error::new)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Node<K, V>> {
        BINCODER.deserialize(data).map_err(Error::new)
    }

    fn format(&self, key: &K) -> String {
        format!("{key:?}")
    }
}
