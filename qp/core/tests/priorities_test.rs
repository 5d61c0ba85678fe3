//! Priority-set tests for qp-core

use qp_core::{QPSet, QPSET_MAX};

#[test]
fn test_every_priority_is_its_own_max() {
    for prio in 1..=QPSET_MAX {
        let mut set = QPSet::new();
        set.insert(prio);
        assert_eq!(set.find_max(), Some(prio));
    }
}

#[test]
fn test_iter_descending() {
    let mut set = QPSet::new();
    for prio in [3, 17, 40, 9, 64] {
        set.insert(prio);
    }
    let order: Vec<u8> = set.iter().collect();
    assert_eq!(order, vec![64, 40, 17, 9, 3]);
}

#[test]
fn test_contains_out_of_range() {
    let set = QPSet::new();
    assert!(!set.contains(0));
    assert!(!set.contains(65));
}

#[test]
fn test_clear() {
    let mut set = QPSet::new();
    set.insert(12);
    set.insert(50);
    set.clear();
    assert!(set.is_empty());
}
