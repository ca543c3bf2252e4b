use ordered_trees::{comparator, AvlTree, BTree, Mode, RedBlackTree, Tree, TreeCore};
use proptest::prelude::*;

/// Asserts that every argument equals the first.
#[allow(unused_macros)]
macro_rules! assert_eq_all {
    ($first:expr, $($rest:expr),+ $(,)?) => {{
        let first = &$first;
        $( assert_eq!(*first, $rest); )+
    }};
}

#[allow(dead_code)]
pub(super) type U16Pairs = Vec<(u16, u16)>;

#[allow(dead_code)]
pub(super) fn small_int_pairs() -> impl Strategy<Value = U16Pairs> {
    prop::collection::vec((0u16..1024u16, 0u16..1024u16), 0..512)
}

#[allow(dead_code)]
pub(super) fn string_u16_pairs() -> impl Strategy<Value = Vec<(String, u16)>> {
    prop::collection::vec(("[a-z]{0,2}", 0u16..1024u16), 0..512)
}

/// A mutation to replay against every map.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub(super) enum Op {
    Set(u16, u16),
    Remove(u16),
    SetIfNotExist(u16, u16),
}

#[allow(dead_code)]
pub(super) fn ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        3 => (0u16..256, any::<u16>()).prop_map(|(k, v)| Op::Set(k, v)),
        2 => (0u16..256).prop_map(Op::Remove),
        1 => (0u16..256, any::<u16>()).prop_map(|(k, v)| Op::SetIfNotExist(k, v)),
    ];
    prop::collection::vec(op, 0..400)
}

/// One tree of each kind, B-trees at several orders, over the natural order.
#[allow(dead_code)]
pub(super) struct Trees<K, V> {
    pub(super) avl: AvlTree<K, V>,
    pub(super) rb: RedBlackTree<K, V>,
    pub(super) bt3: BTree<K, V>,
    pub(super) bt4: BTree<K, V>,
    pub(super) bt5: BTree<K, V>,
    pub(super) bt7: BTree<K, V>,
}

#[allow(dead_code)]
impl<K: Ord + Clone + 'static, V: Clone> Trees<K, V> {
    pub(super) fn new() -> Self {
        Trees {
            avl: AvlTree::new(comparator::natural()),
            rb: RedBlackTree::new(comparator::natural()),
            bt3: BTree::new(3, comparator::natural()),
            bt4: BTree::new(4, comparator::natural()),
            bt5: BTree::new(5, comparator::natural()),
            bt7: BTree::new(7, comparator::natural()),
        }
    }

    pub(super) fn from_pairs(v: Vec<(K, V)>) -> Self {
        let trees = Self::new();
        trees.for_each(|t| t.sets(v.clone()));
        trees
    }

    /// Runs `f` on the binary trees and on every B-tree.
    pub(super) fn for_each(&self, mut f: impl FnMut(&dyn Ops<K, V>)) {
        f(&self.avl);
        f(&self.rb);
        f(&self.bt3);
        f(&self.bt4);
        f(&self.bt5);
        f(&self.bt7);
    }
}

/// The slice of the tree surface the cross-checks drive, made object safe so
/// one closure can visit every variant.
#[allow(dead_code)]
pub(super) trait Ops<K, V> {
    fn name(&self) -> &'static str;
    fn sets(&self, v: Vec<(K, V)>);
    fn set(&self, k: K, v: V);
    fn set_if_not_exist(&self, k: K, v: V) -> bool;
    fn remove(&self, k: &K) -> Option<V>;
    fn get(&self, k: &K) -> Option<V>;
    fn len(&self) -> usize;
    fn entries(&self) -> Vec<(K, V)>;
    fn desc_entries(&self) -> Vec<(K, V)>;
    fn from_asc(&self, k: &K, exact: bool, limit: usize) -> Vec<K>;
    fn from_desc(&self, k: &K, exact: bool, limit: usize) -> Vec<K>;
    fn floor(&self, k: &K) -> Option<(K, V)>;
    fn ceiling(&self, k: &K) -> Option<(K, V)>;
    fn left(&self) -> Option<(K, V)>;
    fn right(&self) -> Option<(K, V)>;
    fn check(&self) -> Result<(), String>;
}

fn visit<K: Clone, F>(limit: usize, walk: F) -> Vec<K>
where
    F: FnOnce(&mut dyn FnMut(&K) -> bool),
{
    let mut out = Vec::new();
    walk(&mut |k: &K| {
        out.push(k.clone());
        out.len() < limit
    });
    out
}

impl<C, M, K, V> Ops<K, V> for Tree<C, M>
where
    C: TreeCore<Key = K, Value = V>,
    M: Mode,
    K: Clone,
    V: Clone,
{
    fn name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn sets(&self, v: Vec<(K, V)>) {
        Tree::sets(self, v)
    }

    fn set(&self, k: K, v: V) {
        Tree::set(self, k, v)
    }

    fn set_if_not_exist(&self, k: K, v: V) -> bool {
        Tree::set_if_not_exist(self, k, v)
    }

    fn remove(&self, k: &K) -> Option<V> {
        Tree::remove(self, k)
    }

    fn get(&self, k: &K) -> Option<V> {
        Tree::get(self, k)
    }

    fn len(&self) -> usize {
        Tree::len(self)
    }

    fn entries(&self) -> Vec<(K, V)> {
        Tree::entries(self)
    }

    fn desc_entries(&self) -> Vec<(K, V)> {
        let mut out = Vec::new();
        self.iterator_desc(|k, v| {
            out.push((k.clone(), v.clone()));
            true
        });
        out
    }

    fn from_asc(&self, k: &K, exact: bool, limit: usize) -> Vec<K> {
        visit(limit, |f: &mut dyn FnMut(&K) -> bool| {
            self.iterator_asc_from(k, exact, |k, _| f(k))
        })
    }

    fn from_desc(&self, k: &K, exact: bool, limit: usize) -> Vec<K> {
        visit(limit, |f: &mut dyn FnMut(&K) -> bool| {
            self.iterator_desc_from(k, exact, |k, _| f(k))
        })
    }

    fn floor(&self, k: &K) -> Option<(K, V)> {
        Tree::floor(self, k)
    }

    fn ceiling(&self, k: &K) -> Option<(K, V)> {
        Tree::ceiling(self, k)
    }

    fn left(&self) -> Option<(K, V)> {
        Tree::left(self)
    }

    fn right(&self) -> Option<(K, V)> {
        Tree::right(self)
    }

    fn check(&self) -> Result<(), String> {
        Tree::check(self)
    }
}
