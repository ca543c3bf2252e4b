//! AVL rebalancing over the shared parent-linked binary tree.
//!
//! Every node carries a balance factor, `bal = height(right) - height(left)`,
//! kept in {-1, 0, 1} between operations.  Insertion retraces towards the
//! root until a subtree's height stops growing; at most one single or double
//! rotation is needed.  Deletion retraces while subtree heights keep
//! shrinking and may rotate at several ancestors.

use std::fmt::{self, Display};

use serde::de::{Deserialize, Deserializer};

use crate::arena::NodeId;
use crate::binary::{BinaryTree, Side, Slot};
use crate::comparator::{natural, Comparator};
use crate::guard::{Guarded, Mode, Unguarded};
use crate::tree::sealed::Sealed;
use crate::tree::{Tree, TreeCore};

/// Storage and balancing for [`AvlTree`](crate::AvlTree).
#[derive(Clone, Debug)]
pub struct AvlCore<K, V> {
    tree: BinaryTree<K, V, i8>,
}

impl<K, V> AvlCore<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            tree: BinaryTree::new(),
        }
    }

    fn bal(&self, id: NodeId) -> i8 {
        self.tree.nodes[id].tag
    }

    fn set_bal(&mut self, id: NodeId, bal: i8) {
        self.tree.nodes[id].tag = bal;
    }

    fn child(&self, id: NodeId, side: Side) -> NodeId {
        self.tree
            .child(id, side)
            .expect("unbalanced side has no child")
    }

    //    a(x, b(y, z))   =>   b(a(x, y), z)
    fn rot_lf(&mut self, a: NodeId) -> NodeId {
        let b = self.child(a, Side::Right);
        if self.bal(b) == 0 {
            self.set_bal(a, 1);
            self.set_bal(b, -1);
        } else {
            // b.bal == 1 -> ht(y) < ht(z)
            self.set_bal(a, 0);
            self.set_bal(b, 0);
        }
        self.tree.rotate(a, Side::Left)
    }

    //    a(b(x, y), z)   =>   b(x, a(y, z))
    fn rot_rt(&mut self, a: NodeId) -> NodeId {
        let b = self.child(a, Side::Left);
        if self.bal(b) == 0 {
            // ht(x) = ht(y) = ht(z) + 1
            self.set_bal(a, -1);
            self.set_bal(b, 1);
        } else {
            self.set_bal(a, 0);
            self.set_bal(b, 0);
        }
        self.tree.rotate(a, Side::Right)
    }

    //    a(x, b(c(y, z), w))   =>   c(a(x, y), b(z, w))
    fn rot_rt_lf(&mut self, a: NodeId) -> NodeId {
        let b = self.child(a, Side::Right);
        let c = self.child(b, Side::Left);

        let (a_bal, b_bal) = match self.bal(c) {
            0 => (0, 0),
            1 => (-1, 0),
            _ => (0, 1),
        };
        self.set_bal(a, a_bal);
        self.set_bal(b, b_bal);
        self.set_bal(c, 0);

        self.tree.rotate(b, Side::Right);
        self.tree.rotate(a, Side::Left)
    }

    //    a(b(x, c(y, z)), w)   =>   c(b(x, y), a(z, w))
    fn rot_lf_rt(&mut self, a: NodeId) -> NodeId {
        let b = self.child(a, Side::Left);
        let c = self.child(b, Side::Right);

        let (a_bal, b_bal) = match self.bal(c) {
            0 => (0, 0),
            -1 => (1, 0),
            _ => (0, -1),
        };
        self.set_bal(a, a_bal);
        self.set_bal(b, b_bal);
        self.set_bal(c, 0);

        self.tree.rotate(b, Side::Left);
        self.tree.rotate(a, Side::Right)
    }

    /// Repairs a node whose balance factor reached +/-2.  Returns the new
    /// subtree root and whether the subtree ended up shorter than it was
    /// while unbalanced.
    fn rebal(&mut self, a: NodeId) -> (NodeId, bool) {
        let top = if self.bal(a) < 0 {
            if self.bal(self.child(a, Side::Left)) <= 0 {
                self.rot_rt(a)
            } else {
                self.rot_lf_rt(a)
            }
        } else if self.bal(self.child(a, Side::Right)) >= 0 {
            self.rot_lf(a)
        } else {
            self.rot_rt_lf(a)
        };

        // a zero balance at the new root means the rotation lost a level
        (top, self.bal(top) == 0)
    }

    fn retrace_insert(&mut self, mut child: NodeId) {
        while let Some((p, side)) = self.tree.side_of(child) {
            let bal = self.bal(p) + if side == Side::Right { 1 } else { -1 };
            self.set_bal(p, bal);
            match bal {
                0 => return,
                1 | -1 => child = p,
                _ => {
                    self.rebal(p);
                    return;
                }
            }
        }
    }

    // `at` is the parent and side whose subtree just lost a level
    fn retrace_remove(&mut self, mut at: Option<(NodeId, Side)>) {
        while let Some((p, side)) = at {
            let bal = self.bal(p) + if side == Side::Left { 1 } else { -1 };
            self.set_bal(p, bal);
            let top = match bal {
                0 => p,
                1 | -1 => return,
                _ => match self.rebal(p) {
                    (top, true) => top,
                    (_, false) => return,
                },
            };
            at = self.tree.side_of(top);
        }
    }

    // returns the height of the subtree at `id`
    fn chk_bal(&self, id: Option<NodeId>) -> Result<i8, String> {
        let Some(id) = id else { return Ok(0) };
        let n = &self.tree.nodes[id];
        let lf_ht = self.chk_bal(n.left)?;
        let rt_ht = self.chk_bal(n.right)?;
        if rt_ht - lf_ht != n.tag {
            return Err(format!(
                "balance factor {} where heights differ by {}",
                n.tag,
                rt_ht - lf_ht
            ));
        }
        if !(-1..=1).contains(&n.tag) {
            return Err(format!("node out of balance: {}", n.tag));
        }
        Ok(lf_ht.max(rt_ht) + 1)
    }
}

/// A height-balanced binary search tree.
///
/// See [`Tree`] for the operations.  `M` selects the concurrency mode.
pub type AvlTree<K, V, M = Unguarded> = Tree<AvlCore<K, V>, M>;

impl<K, V> AvlTree<K, V> {
    /// An empty tree without locking.
    pub fn new(cmp: Comparator<K>) -> Self {
        Tree::from_parts(AvlCore::new(), cmp)
    }

    /// An unlocked tree holding `entries`; later duplicates overwrite.
    pub fn new_from<I>(cmp: Comparator<K>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let tree = Self::new(cmp);
        tree.sets(entries);
        tree
    }
}

impl<K, V> AvlTree<K, V, Guarded> {
    /// An empty tree that locks around every operation.
    pub fn new_safe(cmp: Comparator<K>) -> Self {
        Tree::from_parts(AvlCore::new(), cmp)
    }

    /// Like [`new_from`](AvlTree::new_from), but locking.
    pub fn new_safe_from<I>(cmp: Comparator<K>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let tree = Self::new_safe(cmp);
        tree.sets(entries);
        tree
    }
}

impl<K, V, M: Mode> AvlTree<K, V, M> {
    /// A new tree mapping every value to its key, ordered by `cmp`.  When
    /// several keys share a value, the largest key wins.
    pub fn flip(&self, cmp: Comparator<V>) -> AvlTree<V, K, M>
    where
        K: Clone,
        V: Clone,
    {
        self.flip_into(AvlCore::new(), cmp)
    }
}

impl<K: Ord + 'static, V, M: Mode> Default for AvlTree<K, V, M> {
    fn default() -> Self {
        Tree::from_parts(AvlCore::new(), natural())
    }
}

impl<K: Ord + 'static, V, M: Mode> FromIterator<(K, V)> for AvlTree<K, V, M> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::default();
        tree.extend(iter);
        tree
    }
}

impl<'de, K, V, M> Deserialize<'de> for AvlTree<K, V, M>
where
    K: Deserialize<'de> + Ord + 'static,
    V: Deserialize<'de>,
    M: Mode,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Tree::deserialize_with(deserializer, AvlCore::new(), natural())
    }
}

impl<K, V> Sealed for AvlCore<K, V> {}

impl<K, V> TreeCore for AvlCore<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.tree.len()
    }

    fn clear(&mut self) {
        self.tree.clear();
    }

    fn get(&self, cmp: &Comparator<K>, key: &K) -> Option<(&K, &V)> {
        self.tree.find(cmp, key).map(|id| self.tree.entry(id))
    }

    fn insert(&mut self, cmp: &Comparator<K>, key: K, val: V) -> Option<V> {
        match self.tree.locate(cmp, &key) {
            Slot::Found(id) => Some(std::mem::replace(&mut self.tree.nodes[id].val, val)),
            Slot::Vacant(at) => {
                let id = self.tree.attach(at, key, val, 0);
                self.retrace_insert(id);
                None
            }
        }
    }

    fn remove(&mut self, cmp: &Comparator<K>, key: &K) -> Option<(K, V)> {
        let id = self.tree.find(cmp, key)?;
        let doomed = self.tree.swap_with_predecessor(id);
        let at = self.tree.side_of(doomed);
        let n = self.tree.splice_out(doomed);
        self.retrace_remove(at);
        Some((n.key, n.val))
    }

    fn first(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|id| self.tree.entry(id))
    }

    fn last(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|id| self.tree.entry(id))
    }

    fn floor(&self, cmp: &Comparator<K>, key: &K) -> Option<(&K, &V)> {
        self.tree.floor(cmp, key).map(|id| self.tree.entry(id))
    }

    fn ceiling(&self, cmp: &Comparator<K>, key: &K) -> Option<(&K, &V)> {
        self.tree.ceiling(cmp, key).map(|id| self.tree.entry(id))
    }

    fn walk<'a, F>(&'a self, cmp: &Comparator<K>, from: Option<&K>, desc: bool, f: F)
    where
        F: FnMut(&'a K, &'a V) -> bool,
    {
        self.tree.walk_from(cmp, from, desc, f);
    }

    fn height(&self) -> usize {
        self.tree.height()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        K: Display,
    {
        self.tree.render(f)
    }

    fn check(&self, cmp: &Comparator<K>) -> Result<(), String> {
        self.tree.check_links(cmp)?;
        self.chk_bal(self.tree.root).map(|_| ())
    }
}
