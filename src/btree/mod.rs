//! B-tree implementation
//!

// Re-export
pub use self::tree::Direction;
pub use self::tree::Search;
pub use self::tree::Tree;
pub use self::tree::TreeError;
pub use self::tree::TreeKey;
pub use self::tree::TreeValue;

pub mod iter;
pub mod node;
pub mod tree;
pub mod types;
