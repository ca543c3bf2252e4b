use ordered_trees::{comparator, AvlTree, BTree, Guarded, Mode, RedBlackTree, Tree, TreeCore};

#[macro_use]
mod common;

const KEYS: [i32; 7] = [5, 3, 8, 1, 4, 7, 9];

fn seven<C, M>(t: Tree<C, M>) -> Tree<C, M>
where
    C: TreeCore<Key = i32, Value = i32>,
    M: Mode,
{
    t.sets(KEYS.map(|k| (k, -k)));
    t
}

// fresh trees holding KEYS, one per variant and mode
fn every_variant() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(seven(AvlTree::new(comparator::natural()))),
        Box::new(seven(AvlTree::new_safe(comparator::natural()))),
        Box::new(seven(RedBlackTree::new(comparator::natural()))),
        Box::new(seven(RedBlackTree::new_safe(comparator::natural()))),
        Box::new(seven(BTree::new(3, comparator::natural()))),
        Box::new(seven(BTree::new_safe(4, comparator::natural()))),
        Box::new(seven(BTree::new(6, comparator::natural()))),
    ]
}

trait Scenario {
    fn keys(&self) -> Vec<i32>;
    fn floor(&self, k: i32) -> Option<i32>;
    fn ceiling(&self, k: i32) -> Option<i32>;
    fn remove(&self, k: i32) -> Option<i32>;
    fn size(&self) -> usize;
    fn contains(&self, k: i32) -> bool;
    fn check(&self) -> Result<(), String>;
}

impl<C: TreeCore<Key = i32, Value = i32>, M: Mode> Scenario for Tree<C, M> {
    fn keys(&self) -> Vec<i32> {
        Tree::keys(self)
    }

    fn floor(&self, k: i32) -> Option<i32> {
        Tree::floor(self, &k).map(|(k, _)| k)
    }

    fn ceiling(&self, k: i32) -> Option<i32> {
        Tree::ceiling(self, &k).map(|(k, _)| k)
    }

    fn remove(&self, k: i32) -> Option<i32> {
        Tree::remove(self, &k)
    }

    fn size(&self) -> usize {
        Tree::size(self)
    }

    fn contains(&self, k: i32) -> bool {
        Tree::contains(self, &k)
    }

    fn check(&self) -> Result<(), String> {
        Tree::check(self)
    }
}

#[test]
fn keys_come_out_sorted() {
    for t in every_variant() {
        assert_eq!(t.keys(), vec![1, 3, 4, 5, 7, 8, 9]);
        t.check().unwrap();
    }
}

#[test]
fn floor_and_ceiling_between_keys() {
    for t in every_variant() {
        assert_eq!(t.floor(6), Some(5));
        assert_eq!(t.ceiling(6), Some(7));
        assert_eq_all!(t.floor(0), t.ceiling(10), None);
        assert_eq!(t.floor(7), Some(7));
        assert_eq!(t.ceiling(7), Some(7));
    }
}

#[test]
fn remove_the_root_key() {
    for t in every_variant() {
        assert_eq!(t.remove(5), Some(-5));
        assert_eq!(t.size(), 6);
        assert!(!t.contains(5));
        assert_eq!(t.keys(), vec![1, 3, 4, 7, 8, 9]);
        assert_eq!(t.remove(5), None);
        t.check().unwrap();
    }
}

#[test]
fn repeated_set_is_idempotent() {
    let t = BTree::new(4, comparator::natural());
    t.set(1, 10);
    t.set(1, 10);
    assert_eq!(t.size(), 1);
    assert_eq!(t.get(&1), Some(10));

    let t = AvlTree::new_safe(comparator::natural());
    t.set("k", 'v');
    t.set("k", 'v');
    assert_eq!(t.size(), 1);
    assert_eq!(t.get(&"k"), Some('v'));
}

#[test]
fn order_three_btree_splits_its_root() {
    let t = BTree::new(3, comparator::natural());
    t.set(1, ());
    assert_eq!(t.height(), 1);

    for k in 2..=10 {
        t.set(k, ());
        t.check().unwrap();
    }
    assert!(t.height() > 1);
    assert_eq!(t.keys(), (1..=10).collect::<Vec<_>>());
}

#[test]
fn set_if_not_exist_keeps_the_first_value() {
    let avl = AvlTree::new(comparator::natural());
    let rb = RedBlackTree::new_safe(comparator::natural());
    let bt = BTree::new(5, comparator::natural());

    assert!(avl.set_if_not_exist("a", 1));
    assert!(!avl.set_if_not_exist("a", 2));
    assert!(rb.set_if_not_exist("a", 1));
    assert!(!rb.set_if_not_exist("a", 2));
    assert!(bt.set_if_not_exist("a", 1));
    assert!(!bt.set_if_not_exist("a", 2));

    assert_eq_all!(avl.get(&"a"), rb.get(&"a"), bt.get(&"a"), Some(1));
}

#[test]
fn custom_ordering_drives_placement() {
    let t = AvlTree::new(comparator::reverse());
    t.sets([(1, 'a'), (3, 'c'), (2, 'b')]);
    assert_eq!(t.keys(), vec![3, 2, 1]);
    // floor is "at or before" in the tree's own order
    assert_eq!(t.floor(&0), Some((1, 'a')));
    assert_eq!(t.ceiling(&4), Some((3, 'c')));
    assert_eq!(t.floor(&4), None);
}

#[test]
fn equal_under_the_comparator_means_same_key() {
    let t = RedBlackTree::new(comparator::by_key(|s: &String| s.len()));
    t.set("ab".to_string(), 1);
    t.set("cd".to_string(), 2);
    assert_eq!(t.len(), 1);
    assert_eq!(t.search(&"xy".to_string()), Some(("ab".to_string(), 2)));
}

#[test]
fn set_comparator_resorts() {
    let t = RedBlackTree::new_safe(comparator::natural());
    t.sets((0..50).map(|k| (k, k)));
    t.set_comparator(comparator::reverse());
    t.check().unwrap();
    assert_eq!(t.left(), Some((49, 49)));
    assert_eq!(t.right(), Some((0, 0)));

    t.set(50, 50);
    assert_eq!(t.keys()[0], 50);
}

#[test]
fn flip_swaps_keys_and_values() {
    let t = BTree::new(4, comparator::natural());
    t.sets([(1, "x"), (2, "y"), (3, "x")]);

    let f = t.flip(comparator::natural());
    assert_eq!(f.order(), 4);
    assert_eq!(f.entries(), vec![("x", 3), ("y", 2)]);
    f.check().unwrap();

    let rb = RedBlackTree::new_safe(comparator::natural());
    rb.sets([(1, 10), (2, 20)]);
    let f = rb.flip(comparator::reverse());
    assert!(f.is_safe());
    assert_eq!(f.keys(), vec![20, 10]);
}

#[test]
fn clones_are_independent() {
    let t = AvlTree::new(comparator::natural());
    t.sets([(1, 1), (2, 2)]);
    let c = t.clone();
    c.set(3, 3);
    t.remove(&1);
    assert_eq!(t.keys(), vec![2]);
    assert_eq!(c.keys(), vec![1, 2, 3]);
}

#[test]
fn replace_and_clear() {
    let t = BTree::new(3, comparator::natural());
    t.sets((0..20).map(|k| (k, k)));
    t.replace([(100, 1), (50, 2)]);
    assert_eq!(t.keys(), vec![50, 100]);
    t.check().unwrap();

    t.clear();
    assert!(t.is_empty());
    assert_eq!(t.height(), 0);
    assert_eq!(t.left(), None);
}

#[test]
fn iteration_stops_when_asked() {
    let t: RedBlackTree<i32, i32> = (0..100).map(|k| (k, k)).collect();
    let mut seen = Vec::new();
    t.iterator(|k, _| {
        seen.push(*k);
        seen.len() < 3
    });
    assert_eq!(seen, vec![0, 1, 2]);

    seen.clear();
    t.iterator_from(&50, true, |k, _| {
        seen.push(*k);
        *k < 52
    });
    assert_eq!(seen, vec![50, 51, 52]);
}

#[test]
fn display_draws_the_tree() {
    let t = AvlTree::new(comparator::natural());
    t.sets([(2, ()), (1, ()), (3, ())]);
    assert_eq!(t.to_string(), "│   ┌── 3\n└── 2\n    └── 1\n");

    let t = BTree::new(3, comparator::natural());
    t.sets([(1, ()), (2, ()), (3, ())]);
    assert_eq!(t.to_string(), "    1\n2\n    3\n");
}

#[test]
fn map_snapshot() {
    let t = AvlTree::new(comparator::natural());
    t.sets([("b", 2), ("a", 1)]);
    let m = t.map();
    assert_eq!(m.len(), 2);
    assert_eq!(m["a"], 1);
}

#[test]
fn btree_rejects_small_orders() {
    assert!(BTree::<i32, i32>::try_new(2, comparator::natural()).is_err());
    assert!(BTree::<i32, i32, Guarded>::try_new_safe(0, comparator::natural()).is_err());
    assert_eq!(BTree::<i32, i32>::try_new(3, comparator::natural()).unwrap().order(), 3);
}

#[test]
#[should_panic]
fn btree_new_panics_on_small_orders() {
    BTree::<i32, i32>::new(2, comparator::natural());
}
