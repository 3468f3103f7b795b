use super::*;

use std::collections::BTreeSet;

use anyhow::Result;
use rand::Rng;

use crate::btree::node::Node;
use crate::btree::types::LongMap;
use crate::btree::types::LongSet;
use crate::store::Accessor;
use crate::store::MemStore;

fn set_tree(max_size: usize) -> Tree<LongSet, MemStore<LongSet>> {
    Tree::new(LongSet, MemStore::new(LongSet), max_size).expect("creates tree")
}

fn map_tree(max_size: usize) -> Tree<LongMap, MemStore<LongMap>> {
    Tree::new(LongMap, MemStore::new(LongMap), max_size).expect("creates tree")
}

fn tree_err(err: anyhow::Error) -> TreeError {
    err.downcast::<TreeError>().expect("tree error")
}

#[test]
fn it_rejects_tiny_branching_factors() {
    for max_size in [0, 1] {
        let err = Tree::new(LongSet, MemStore::new(LongSet), max_size)
            .err()
            .expect("rejects branching factor");
        assert_eq!(tree_err(err), TreeError::BranchTooSmall(max_size));
    }
}

#[test]
fn it_searches_an_empty_tree() {
    let mut tree = set_tree(4);
    assert!(!tree.contains(&7).expect("searches"));
    assert_eq!(tree.find(&7).expect("searches"), Search::NotFound);
    assert!(tree.flatten().expect("flattens").is_empty());
    assert_eq!(tree.len(), 0);
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    tree.validate().expect("validates");
}

#[test_log::test]
fn it_inserts_ascending_and_splits() {
    let mut tree = set_tree(2);
    for i in 1..=7 {
        tree.insert(i, ()).expect("inserts");
        tree.validate().expect("validates");
        assert_eq!(tree.len(), i as usize);
    }
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.flatten().expect("flattens"), (1..=7).collect::<Vec<_>>());
    for i in 1..=7 {
        assert_eq!(tree.find(&i).expect("searches"), Search::Found);
    }
    assert!(!tree.contains(&0).expect("searches"));
    assert!(!tree.contains(&8).expect("searches"));
}

#[test]
fn it_stores_and_returns_values() {
    let mut tree = map_tree(2);
    for i in 1..=7 {
        tree.insert(i, i * 10).expect("inserts");
    }
    tree.validate().expect("validates");
    for i in 1..=7 {
        assert_eq!(tree.find(&i).expect("searches"), Search::FoundValue(i * 10));
        assert_eq!(tree.get(&i).expect("searches"), Some(i * 10));
    }
    assert_eq!(tree.get(&8).expect("searches"), None);
}

#[test]
fn it_rejects_duplicate_keys() {
    let mut tree = map_tree(4);
    tree.insert(5, 50).expect("inserts");
    let err = tree.insert(5, 51).err().expect("rejects duplicate");
    assert_eq!(tree_err(err), TreeError::DuplicateKey);
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.get(&5).expect("searches"), Some(50));
    tree.validate().expect("validates");
}

#[test]
fn it_rejects_removing_an_absent_key() {
    let mut tree = set_tree(2);
    for i in 1..=5 {
        tree.insert(i, ()).expect("inserts");
    }
    let before = tree.flatten().expect("flattens");
    let err = tree.remove(&9).err().expect("rejects absent key");
    assert_eq!(tree_err(err), TreeError::NotFound);
    assert_eq!(tree.flatten().expect("flattens"), before);
    assert_eq!(tree.len(), 5);
    tree.validate().expect("validates");
}

#[test]
fn it_removes_from_a_roomy_leaf() {
    let mut tree = set_tree(2);
    for i in 1..=8 {
        tree.insert(i, ()).expect("inserts");
    }
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.remove(&8).expect("removes"), None);
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.flatten().expect("flattens"), (1..=7).collect::<Vec<_>>());
    tree.validate().expect("validates");
}

#[test_log::test]
fn it_rotates_from_a_left_sibling() {
    let mut tree = set_tree(2);
    for i in 1..=8 {
        tree.insert(-i, ()).expect("inserts");
    }
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.remove(&-5).expect("removes"), None);
    assert_eq!(tree.height(), 3);
    assert_eq!(
        tree.flatten().expect("flattens"),
        vec![-8, -7, -6, -4, -3, -2, -1]
    );
    tree.validate().expect("validates");
}

#[test_log::test]
fn it_merges_and_collapses_the_root() {
    let mut tree = set_tree(2);
    for i in 1..=8 {
        tree.insert(i, ()).expect("inserts");
    }
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.remove(&3).expect("removes"), None);
    assert_eq!(tree.height(), 2);
    assert_eq!(
        tree.flatten().expect("flattens"),
        vec![1, 2, 4, 5, 6, 7, 8]
    );
    tree.validate().expect("validates");
}

#[test]
fn it_removes_an_internal_key_through_its_predecessor() {
    let mut tree = map_tree(2);
    for i in 1..=7 {
        tree.insert(i, i * 10).expect("inserts");
    }
    // 4 sits in the root of a height 3 tree
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.remove(&4).expect("removes"), Some(40));
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.flatten().expect("flattens"), vec![1, 2, 3, 5, 6, 7]);
    for i in [1, 2, 3, 5, 6, 7] {
        assert_eq!(tree.get(&i).expect("searches"), Some(i * 10));
    }
    assert_eq!(tree.get(&4).expect("searches"), None);
    tree.validate().expect("validates");
}

#[test]
fn it_keeps_values_with_their_keys_when_rotating_from_the_right() {
    let mut store = MemStore::new(LongMap);
    let a = Node::from_parts(vec![1, 2], Some(vec![10, 20]), None);
    let b = Node::from_parts(vec![12, 13], Some(vec![120, 130]), None);
    let c = Node::from_parts(vec![25, 26, 27], Some(vec![250, 260, 270]), None);
    let a = store.insert(a).expect("inserts");
    let b = store.insert(b).expect("inserts");
    let c = store.insert(c).expect("inserts");
    let root = Node::from_parts(vec![10, 20], Some(vec![100, 200]), Some(vec![a, b, c]));
    let root = store.insert(root).expect("inserts");

    let mut tree = Tree::attach(LongMap, store, root, 2, 9, 4).expect("attaches");
    tree.validate().expect("validates");
    assert_eq!(tree.remove(&13).expect("removes"), Some(130));
    tree.validate().expect("validates");

    // the separator 20 moved down with its own value, 25 moved up with its
    assert_eq!(tree.get(&10).expect("searches"), Some(100));
    assert_eq!(tree.get(&20).expect("searches"), Some(200));
    assert_eq!(tree.get(&25).expect("searches"), Some(250));
}

#[test]
fn it_empties_a_tree_one_key_at_a_time() {
    let mut tree = set_tree(2);
    for i in 1..=8 {
        tree.insert(i, ()).expect("inserts");
    }
    for i in 1..=8 {
        assert_eq!(tree.remove(&i).expect("removes"), None);
        tree.validate().expect("validates");
        assert_eq!(tree.len(), (8 - i) as usize);
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert!(tree.flatten().expect("flattens").is_empty());
}

#[test_log::test]
fn it_matches_a_model_under_random_operations() {
    let mut tree = map_tree(8);
    let mut model = BTreeSet::new();
    for _ in 0..400 {
        let key = rand::thread_rng().gen_range(0..500);
        if model.insert(key) {
            tree.insert(key, key * 2).expect("inserts");
        } else {
            let err = tree.insert(key, key * 2).err().expect("rejects duplicate");
            assert_eq!(tree_err(err), TreeError::DuplicateKey);
        }
    }
    tree.validate().expect("validates");
    assert_eq!(tree.len(), model.len());
    for key in &model {
        assert_eq!(tree.get(key).expect("searches"), Some(key * 2));
    }

    let keys: Vec<i64> = model.iter().copied().collect();
    for (round, key) in keys.iter().enumerate() {
        assert_eq!(tree.remove(key).expect("removes"), Some(key * 2));
        model.remove(key);
        if round % 16 == 0 {
            tree.validate().expect("validates");
            assert_eq!(
                tree.flatten().expect("flattens"),
                model.iter().copied().collect::<Vec<_>>()
            );
        }
    }
    tree.validate().expect("validates");
    assert!(tree.is_empty());
    tree.info();
}

#[test]
fn it_iterates_in_both_directions() {
    let mut tree = set_tree(3);
    for i in 1..=20 {
        tree.insert(i, ()).expect("inserts");
    }
    let ascending: Vec<i64> = tree
        .keys(Direction::Ascending)
        .collect::<Result<_>>()
        .expect("iterates");
    assert_eq!(ascending, (1..=20).collect::<Vec<_>>());
    let descending: Vec<i64> = tree
        .keys(Direction::Descending)
        .collect::<Result<_>>()
        .expect("iterates");
    assert_eq!(descending, (1..=20).rev().collect::<Vec<_>>());
}

#[test]
fn it_iterates_an_empty_tree() {
    let mut tree = set_tree(3);
    assert!(tree.keys(Direction::Ascending).next().is_none());
    assert!(tree.keys(Direction::Descending).next().is_none());
}

#[test]
fn it_rolls_back_to_the_last_commit() {
    let mut tree = map_tree(4);
    for i in 1..=10 {
        tree.insert(i, i).expect("inserts");
    }
    tree.commit().expect("commits");

    for i in 11..=20 {
        tree.insert(i, i).expect("inserts");
    }
    for i in 1..=3 {
        assert_eq!(tree.remove(&i).expect("removes"), Some(i));
    }
    assert_eq!(tree.len(), 17);

    tree.discard().expect("discards");
    assert_eq!(tree.len(), 10);
    assert_eq!(
        tree.flatten().expect("flattens"),
        (1..=10).collect::<Vec<_>>()
    );
    tree.validate().expect("validates");

    // changes before a commit stick through a later discard
    tree.insert(11, 11).expect("inserts");
    tree.commit().expect("commits");
    tree.discard().expect("discards");
    assert_eq!(tree.len(), 11);
    assert!(tree.contains(&11).expect("searches"));
}

#[test]
fn it_discards_everything_since_creation() {
    let mut tree = set_tree(2);
    for i in 1..=8 {
        tree.insert(i, ()).expect("inserts");
    }
    tree.discard().expect("discards");
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert!(tree.flatten().expect("flattens").is_empty());
    tree.validate().expect("validates");
}

#[test_log::test]
fn it_clears_and_accepts_new_keys() {
    let mut tree = set_tree(4);
    let mut input = vec![];
    for _ in 0..100 {
        let key = rand::thread_rng().gen_range(0..10_000);
        if tree.insert(key, ()).is_ok() {
            input.push(key);
        }
    }
    tree.info();
    tree.clear().expect("clears");
    for key in input {
        assert!(!tree.contains(&key).expect("searches"));
    }
    assert_eq!(tree.len(), 0);
    tree.validate().expect("validates");
    tree.insert(1, ()).expect("inserts");
    assert!(tree.contains(&1).expect("searches"));
}

#[test]
fn it_reports_utilization() {
    let mut tree = set_tree(4);
    assert_eq!(tree.utilization().expect("measures"), 0.0);
    for i in 1..=16 {
        tree.insert(i, ()).expect("inserts");
    }
    let utilization = tree.utilization().expect("measures");
    assert!(utilization > 0.0);
    assert!(utilization <= 1.0);
}

#[test]
fn it_serializes_nodes_in_the_reference_layout() {
    let mut tree = set_tree(10);
    for i in 0..=6 {
        tree.insert(i, ()).expect("inserts");
    }
    tree.commit().expect("commits");

    let data = tree
        .store
        .persisted(tree.root)
        .expect("root is persisted")
        .to_vec();
    // count, then key/child pairs, then the trailing child
    assert_eq!(data.len(), 4 + 7 * 8 + 4);
    assert_eq!(&data[..4], &[0, 0, 0, 7]);
    assert_eq!(&data[4..8], &[0, 0, 0, 0]);
    assert_eq!(&data[8..12], &[0, 0, 0, 0]);
    assert_eq!(&data[12..16], &[0, 0, 0, 1]);
    assert_eq!(&data[60..], &[0, 0, 0, 0]);
}

#[test]
fn it_detects_an_empty_parent_as_corruption() {
    let mut store = MemStore::new(LongSet);
    let leaf = Node::from_parts(vec![1, 2], None, None);
    let leaf = store.insert(leaf).expect("inserts");
    let root: Node<i64, ()> = Node::from_parts(vec![], None, Some(vec![leaf]));
    let root = store.insert(root).expect("inserts");

    let mut tree = Tree::attach(LongSet, store, root, 2, 2, 4).expect("attaches");
    let err = tree.remove(&1).err().expect("detects corruption");
    assert!(matches!(tree_err(err), TreeError::Corrupt(_)));
}

#[test]
fn it_detects_a_shallow_tree_as_corruption() {
    let mut store = MemStore::new(LongSet);
    let left = Node::from_parts(vec![1], None, None);
    let left = store.insert(left).expect("inserts");
    let right = Node::from_parts(vec![9], None, None);
    let right = store.insert(right).expect("inserts");
    let root: Node<i64, ()> = Node::from_parts(vec![5], None, Some(vec![left, right]));
    let root = store.insert(root).expect("inserts");

    // header claims one more level than the nodes provide
    let mut tree = Tree::attach(LongSet, store, root, 3, 3, 4).expect("attaches");
    let err = tree.find(&1).err().expect("detects corruption");
    assert!(matches!(tree_err(err), TreeError::Corrupt(_)));
}

#[test]
fn it_detects_orphaned_nodes() {
    let mut tree = set_tree(4);
    for i in 1..=3 {
        tree.insert(i, ()).expect("inserts");
    }
    tree.validate().expect("validates");

    let orphan: Node<i64, ()> = Node::from_parts(vec![99], None, None);
    tree.store.insert(orphan).expect("inserts");
    let err = tree.validate().err().expect("detects corruption");
    assert!(matches!(tree_err(err), TreeError::Corrupt(_)));
}

#[test]
fn it_prints_without_panicking() {
    let mut tree = map_tree(2);
    for i in 1..=7 {
        tree.insert(i, i).expect("inserts");
    }
    tree.print().expect("prints");
}
