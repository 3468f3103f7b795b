#![warn(missing_docs)]
//! Pagetree B-tree
//!
//! # Implementation Details
//!
//! Provides an order-preserving B-tree for storing keys (and optionally
//! values) on top of a pluggable storage accessor.
//!
//! The defining feature is that node storage is never assumed to be plain
//! memory. Nodes reference each other through accessor-assigned integer
//! identifiers, and every node access goes through the [`store::Accessor`]
//! trait, which can load, persist and evict nodes independently of the
//! balancing logic. This lets the same tree sit on top of a transactional
//! page file, a write-ahead log, or transient memory for testing.
//!
//! A node is either:
//!  - a leaf node, containing keys (and values, in map mode)
//!  - an internal node, containing keys and child node identifiers
//!
//! How a key compares, formats and serializes is described once, at tree
//! creation time, by a [`btree::types::TreeType`] descriptor. The crate
//! ships reference descriptors for integer sets and maps (with a fixed
//! big-endian wire format) and a bincode descriptor for arbitrary serde
//! types.
//!
//! The engine is synchronous and single-threaded: every accessor call is a
//! blocking call that completes before the algorithm proceeds, and hosts
//! must serialize concurrent access to a tree themselves. `commit` persists
//! and evicts the batch of mutations since the previous boundary; `discard`
//! throws that batch away, rolling the tree back.

pub mod btree;
pub mod store;

use bincode::config::AllowTrailing;
use bincode::config::FixintEncoding;
use bincode::config::WithOtherIntEncoding;
use bincode::config::WithOtherTrailing;
use bincode::{DefaultOptions, Options};
use std::sync::LazyLock;

static BINCODER: LazyLock<
    WithOtherIntEncoding<WithOtherTrailing<DefaultOptions, AllowTrailing>, FixintEncoding>,
> = LazyLock::new(|| {
    bincode::DefaultOptions::new()
        .allow_trailing_bytes()
        .with_fixint_encoding()
});
