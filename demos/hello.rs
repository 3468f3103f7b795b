use anyhow::Result;

use pagetree::btree::types::LongMap;
use pagetree::btree::Tree;
use pagetree::store::MemStore;

fn main() -> Result<()> {
    let key = 42;
    let value = 3;

    // Create a tree with a branching factor of 7
    let mut tree = Tree::new(LongMap, MemStore::new(LongMap), 7)?;

    // Make sure we can't find our key in the tree
    assert!(!tree.contains(&key)?);
    assert_eq!(tree.get(&key)?, None);

    // Insert the key with a value of 3
    tree.insert(key, value)?;

    // Make sure we can find it
    assert!(tree.contains(&key)?);
    assert_eq!(tree.get(&key)?, Some(value));

    // Remove it again, getting the stored value back
    assert_eq!(tree.remove(&key)?, Some(value));
    assert!(!tree.contains(&key)?);
    assert_eq!(tree.get(&key)?, None);

    // Durable once committed
    tree.commit()?;
    Ok(())
}
