// tests/planner/relation_set_test.rs
use ljqo::planner::RelationSet;
use std::collections::HashSet;

#[test]
fn test_insert_and_contains() {
    let mut set = RelationSet::new();
    assert!(set.is_empty());

    set.insert(3);
    set.insert(70);
    set.insert(3);

    assert_eq!(set.len(), 2);
    assert!(set.contains(3));
    assert!(set.contains(70));
    assert!(!set.contains(4));
    assert!(!set.contains(500));
}

#[test]
fn test_iteration_is_ascending() {
    let set: RelationSet = [129, 0, 64, 5].into_iter().collect();
    assert_eq!(set.to_vec(), vec![0, 5, 64, 129]);
    assert_eq!(set.first(), Some(0));
    assert_eq!(set.to_string(), "{0,5,64,129}");
}

#[test]
fn test_set_algebra() {
    let a: RelationSet = [0, 1, 2].into_iter().collect();
    let b: RelationSet = [2, 3].into_iter().collect();

    assert!(a.intersects(&b));
    assert_eq!(a.union(&b).to_vec(), vec![0, 1, 2, 3]);
    assert_eq!(a.intersection(&b).to_vec(), vec![2]);
    assert_eq!(a.difference(&b).to_vec(), vec![0, 1]);
    assert!(RelationSet::single(1).is_subset(&a));
    assert!(!b.is_subset(&a));
}

#[test]
fn test_equality_ignores_trailing_words() {
    let mut wide = RelationSet::single(200);
    wide.insert(1);
    wide.remove(200);

    let narrow = RelationSet::single(1);
    assert_eq!(wide, narrow);

    let mut seen = HashSet::new();
    seen.insert(wide);
    assert!(seen.contains(&narrow));
}

#[test]
fn test_full_set() {
    let full = RelationSet::full(66);
    assert_eq!(full.len(), 66);
    assert!(full.contains(65));
    assert!(!full.contains(66));
    assert!(RelationSet::full(0).is_empty());
}
