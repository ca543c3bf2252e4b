//! Red-black rebalancing over the shared parent-linked binary tree.
//!
//! New nodes enter red and the insertion cases walk the red-red conflict up
//! towards the root.  Removing a black leaf leaves a black deficit at its
//! position, which the deletion cases push upwards until a red node absorbs
//! it or a rotation pays it off.  Absent children count as black.

use std::fmt::{self, Display};

use serde::de::{Deserialize, Deserializer};
use tracing::debug;

use crate::arena::NodeId;
use crate::binary::{BinaryTree, Slot};
use crate::comparator::{natural, Comparator};
use crate::guard::{Guarded, Mode, Unguarded};
use crate::tree::sealed::Sealed;
use crate::tree::{Tree, TreeCore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Color {
    Red,
    Black,
}

use Color::*;

/// Storage and balancing for [`RedBlackTree`](crate::RedBlackTree).
#[derive(Clone, Debug)]
pub struct RbCore<K, V> {
    tree: BinaryTree<K, V, Color>,
}

impl<K, V> RbCore<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            tree: BinaryTree::new(),
        }
    }

    fn color(&self, id: Option<NodeId>) -> Color {
        id.map_or(Black, |id| self.tree.nodes[id].tag)
    }

    fn paint(&mut self, id: NodeId, color: Color) {
        self.tree.nodes[id].tag = color;
    }

    fn parent(&self, id: NodeId) -> NodeId {
        self.tree.parent(id).expect("non-root node has a parent")
    }

    fn insert_fixup(&mut self, mut node: NodeId) {
        loop {
            // case 1: the root is always black
            let Some(p) = self.tree.parent(node) else {
                self.paint(node, Black);
                return;
            };

            // case 2: a black parent tolerates a red child
            if self.color(Some(p)) == Black {
                return;
            }

            // a red parent is never the root
            let g = self.parent(p);
            let uncle = self.tree.sibling(p);

            // case 3: red uncle, push the conflict up two levels
            if let Some(u) = uncle.filter(|&u| self.color(Some(u)) == Red) {
                self.paint(p, Black);
                self.paint(u, Black);
                self.paint(g, Red);
                node = g;
                continue;
            }

            // case 4: straighten an inner grandchild into an outer one
            let (_, p_side) = self.tree.side_of(p).expect("parent hangs below g");
            let (_, n_side) = self.tree.side_of(node).expect("node hangs below p");
            let mut p = p;
            if n_side != p_side {
                self.tree.rotate(p, p_side);
                node = p;
                p = self.parent(node);
            }

            // case 5: rotate the grandparent away from the outer grandchild
            self.paint(p, Black);
            self.paint(g, Red);
            self.tree.rotate(g, p_side.flip());
            return;
        }
    }

    // `node` is black, still linked, and about to lose one black level
    fn delete_fixup(&mut self, mut node: NodeId) {
        loop {
            // case 1: a deficit at the root is no deficit
            let Some((p, side)) = self.tree.side_of(node) else {
                return;
            };
            let mut sib = self.tree.child(p, side.flip()).expect("black node has a sibling");

            // case 2: make the sibling black
            if self.color(Some(sib)) == Red {
                self.paint(p, Red);
                self.paint(sib, Black);
                self.tree.rotate(p, side);
                sib = self.tree.child(p, side.flip()).expect("black node has a sibling");
            }

            let near = self.tree.child(sib, side);
            let far = self.tree.child(sib, side.flip());
            let nephews_black = self.color(near) == Black && self.color(far) == Black;

            // case 3: move the deficit up to the parent
            if nephews_black && self.color(Some(p)) == Black {
                self.paint(sib, Red);
                node = p;
                continue;
            }

            // case 4: a red parent absorbs it
            if nephews_black {
                self.paint(sib, Red);
                self.paint(p, Black);
                return;
            }

            // case 5: turn a red near nephew into a red far nephew
            if self.color(far) == Black {
                let near = near.expect("red nephew exists");
                self.paint(sib, Red);
                self.paint(near, Black);
                self.tree.rotate(sib, side.flip());
                sib = self.tree.child(p, side.flip()).expect("black node has a sibling");
            }

            // case 6: rotate the parent towards the deficit
            let far = self.tree.child(sib, side.flip()).expect("red nephew exists");
            let p_color = self.color(Some(p));
            self.paint(sib, p_color);
            self.paint(p, Black);
            self.paint(far, Black);
            self.tree.rotate(p, side);
            return;
        }
    }

    /// Re-inserts every entry under `cmp`.
    pub(crate) fn resort(&mut self, cmp: &Comparator<K>) {
        let old = std::mem::replace(&mut self.tree, BinaryTree::new());
        for (k, v) in old.into_entries() {
            self.insert(cmp, k, v);
        }
    }

    // returns the black height of the subtree at `id`
    fn chk_colors(&self, id: Option<NodeId>) -> Result<usize, String> {
        let Some(id) = id else { return Ok(1) };
        let n = &self.tree.nodes[id];
        if n.tag == Red && (self.color(n.left) == Red || self.color(n.right) == Red) {
            return Err("red node with a red child".to_string());
        }
        let lf = self.chk_colors(n.left)?;
        let rt = self.chk_colors(n.right)?;
        if lf != rt {
            return Err(format!("black heights differ: {lf} vs {rt}"));
        }
        Ok(lf + (n.tag == Black) as usize)
    }
}

/// A red-black binary search tree.
///
/// See [`Tree`] for the operations.  `M` selects the concurrency mode.
pub type RedBlackTree<K, V, M = Unguarded> = Tree<RbCore<K, V>, M>;

impl<K, V> RedBlackTree<K, V> {
    /// An empty tree without locking.
    pub fn new(cmp: Comparator<K>) -> Self {
        Tree::from_parts(RbCore::new(), cmp)
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

impl<K, V> RedBlackTree<K, V, Guarded> {
    /// An empty tree that locks around every operation.
    pub fn new_safe(cmp: Comparator<K>) -> Self {
        Tree::from_parts(RbCore::new(), cmp)
    }

    /// Like [`new_from`](RedBlackTree::new_from), but locking.
    pub fn new_safe_from<I>(cmp: Comparator<K>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let tree = Self::new_safe(cmp);
        tree.sets(entries);
        tree
    }
}

impl<K, V, M: Mode> RedBlackTree<K, V, M> {
    /// A new tree mapping every value to its key, ordered by `cmp`.  When
    /// several keys share a value, the largest key wins.
    pub fn flip(&self, cmp: Comparator<V>) -> RedBlackTree<V, K, M>
    where
        K: Clone,
        V: Clone,
    {
        self.flip_into(RbCore::new(), cmp)
    }

    /// Switches to a new ordering, re-inserting every entry under one
    /// exclusive lock acquisition.  Entries the new comparator considers
    /// equal collapse into one, keeping the value of the largest old key.
    pub fn set_comparator(&self, cmp: Comparator<K>) {
        self.with_state_mut(|s| {
            s.core.resort(&cmp);
            s.cmp = cmp;
            debug!(len = s.core.len(), "red-black tree re-sorted");
        })
    }
}

impl<K: Ord + 'static, V, M: Mode> Default for RedBlackTree<K, V, M> {
    fn default() -> Self {
        Tree::from_parts(RbCore::new(), natural())
    }
}

impl<K: Ord + 'static, V, M: Mode> FromIterator<(K, V)> for RedBlackTree<K, V, M> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::default();
        tree.extend(iter);
        tree
    }
}

impl<'de, K, V, M> Deserialize<'de> for RedBlackTree<K, V, M>
where
    K: Deserialize<'de> + Ord + 'static,
    V: Deserialize<'de>,
    M: Mode,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Tree::deserialize_with(deserializer, RbCore::new(), natural())
    }
}

impl<K, V> Sealed for RbCore<K, V> {}

impl<K, V> TreeCore for RbCore<K, V> {
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
                let id = self.tree.attach(at, key, val, Red);
                self.insert_fixup(id);
                None
            }
        }
    }

    fn remove(&mut self, cmp: &Comparator<K>, key: &K) -> Option<(K, V)> {
        let id = self.tree.find(cmp, key)?;
        let doomed = self.tree.swap_with_predecessor(id);
        let n = &self.tree.nodes[doomed];
        let child = n.left.or(n.right);

        if n.tag == Black {
            match child {
                // a black node's only child is a red leaf
                Some(c) => self.paint(c, Black),
                None => self.delete_fixup(doomed),
            }
        }

        let n = self.tree.splice_out(doomed);
        if let Some(r) = self.tree.root {
            self.paint(r, Black);
        }
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
        if self.color(self.tree.root) == Red {
            return Err("red root".to_string());
        }
        self.chk_colors(self.tree.root).map(|_| ())
    }
}
