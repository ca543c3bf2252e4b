//! Parent-linked binary search trees.
//!
//! The AVL and red-black variants share everything except their rebalancing
//! rules: node storage, descent, in-order stepping, floor/ceiling, rotations,
//! rendering and the structural checks all live here.  Each node carries a
//! variant-specific `tag` (a balance factor or a color).
//!
//! Children are owned through the arena; `parent` is a navigational handle
//! only.

use std::cmp::Ordering::*;
use std::fmt::{self, Display};

use crate::arena::{Arena, NodeId};
use crate::comparator::Comparator;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    pub(crate) fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BinNode<K, V, T> {
    pub(crate) key: K,
    pub(crate) val: V,
    pub(crate) parent: Option<NodeId>,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) tag: T,
}

impl<K, V, T> BinNode<K, V, T> {
    pub(crate) fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn set_child(&mut self, side: Side, child: Option<NodeId>) {
        match side {
            Side::Left => self.left = child,
            Side::Right => self.right = child,
        }
    }
}

/// Where a key lives, or where it would be attached.
pub(crate) enum Slot {
    Found(NodeId),
    Vacant(Option<(NodeId, Side)>),
}

#[derive(Clone, Debug)]
pub(crate) struct BinaryTree<K, V, T> {
    pub(crate) nodes: Arena<BinNode<K, V, T>>,
    pub(crate) root: Option<NodeId>,
}

impl<K, V, T> BinaryTree<K, V, T> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Arena::new(),
            root: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub(crate) fn entry(&self, id: NodeId) -> (&K, &V) {
        let n = &self.nodes[id];
        (&n.key, &n.val)
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub(crate) fn child(&self, id: NodeId, side: Side) -> Option<NodeId> {
        self.nodes[id].child(side)
    }

    /// The parent of `id` and the side of the parent `id` hangs from.
    pub(crate) fn side_of(&self, id: NodeId) -> Option<(NodeId, Side)> {
        let p = self.parent(id)?;
        if self.nodes[p].left == Some(id) {
            Some((p, Side::Left))
        } else {
            Some((p, Side::Right))
        }
    }

    pub(crate) fn sibling(&self, id: NodeId) -> Option<NodeId> {
        let (p, side) = self.side_of(id)?;
        self.child(p, side.flip())
    }

    pub(crate) fn locate(&self, cmp: &Comparator<K>, key: &K) -> Slot {
        let mut at = None;
        let mut curr = self.root;
        while let Some(id) = curr {
            let side = match cmp(key, &self.nodes[id].key) {
                Equal => return Slot::Found(id),
                Less => Side::Left,
                Greater => Side::Right,
            };
            at = Some((id, side));
            curr = self.child(id, side);
        }
        Slot::Vacant(at)
    }

    pub(crate) fn find(&self, cmp: &Comparator<K>, key: &K) -> Option<NodeId> {
        match self.locate(cmp, key) {
            Slot::Found(id) => Some(id),
            Slot::Vacant(_) => None,
        }
    }

    /// Links a fresh leaf below `at` (or as the root).
    pub(crate) fn attach(
        &mut self,
        at: Option<(NodeId, Side)>,
        key: K,
        val: V,
        tag: T,
    ) -> NodeId {
        let id = self.nodes.alloc(BinNode {
            key,
            val,
            parent: at.map(|(p, _)| p),
            left: None,
            right: None,
            tag,
        });

        match at {
            None => self.root = Some(id),
            Some((p, side)) => self.nodes[p].set_child(side, Some(id)),
        }

        id
    }

    /// Makes `new` take `old`'s place below `old`'s parent.  `old` keeps its
    /// own links.
    pub(crate) fn replace_child(&mut self, old: NodeId, new: Option<NodeId>) {
        let parent = self.parent(old);
        match self.side_of(old) {
            None => self.root = new,
            Some((p, side)) => self.nodes[p].set_child(side, new),
        }
        if let Some(n) = new {
            self.nodes[n].parent = parent;
        }
    }

    /// Rotates the subtree at `a` towards `dir` and returns its new root.
    ///
    /// `rotate(a, Left)` turns `a(x, b(y, z))` into `b(a(x, y), z)`;
    /// `rotate(a, Right)` is the mirror image.
    pub(crate) fn rotate(&mut self, a: NodeId, dir: Side) -> NodeId {
        let up = dir.flip();
        let b = self.child(a, up).expect("rotation without a pivot child");
        let y = self.child(b, dir);

        self.nodes[a].set_child(up, y);
        if let Some(y) = y {
            self.nodes[y].parent = Some(a);
        }

        self.replace_child(a, Some(b));
        self.nodes[b].set_child(dir, Some(a));
        self.nodes[a].parent = Some(b);

        b
    }

    /// Exchanges the entries of a two-child node and its in-order
    /// predecessor.  Returns the node that now holds the entry to delete,
    /// which has at most one child.
    pub(crate) fn swap_with_predecessor(&mut self, id: NodeId) -> NodeId {
        let n = &self.nodes[id];
        let Some(left) = n.left.filter(|_| n.right.is_some()) else {
            return id;
        };

        let pred = self.extreme(left, Side::Right);
        let (a, b) = self.nodes.pair_mut(id, pred);
        std::mem::swap(&mut a.key, &mut b.key);
        std::mem::swap(&mut a.val, &mut b.val);
        pred
    }

    /// Unlinks and frees a node with at most one child, splicing the child
    /// into its place.
    pub(crate) fn splice_out(&mut self, id: NodeId) -> BinNode<K, V, T> {
        let n = &self.nodes[id];
        debug_assert!(n.left.is_none() || n.right.is_none());
        let child = n.left.or(n.right);
        self.replace_child(id, child);
        self.nodes.free(id)
    }

    /// The outermost node of the subtree at `id` on the given side.
    pub(crate) fn extreme(&self, mut id: NodeId, side: Side) -> NodeId {
        while let Some(c) = self.child(id, side) {
            id = c;
        }
        id
    }

    pub(crate) fn first(&self) -> Option<NodeId> {
        self.root.map(|r| self.extreme(r, Side::Left))
    }

    pub(crate) fn last(&self) -> Option<NodeId> {
        self.root.map(|r| self.extreme(r, Side::Right))
    }

    /// In-order neighbour of `id` towards `side` (`Right` = successor).
    pub(crate) fn step(&self, id: NodeId, side: Side) -> Option<NodeId> {
        if let Some(c) = self.child(id, side) {
            return Some(self.extreme(c, side.flip()));
        }

        let mut curr = id;
        while let Some((p, from)) = self.side_of(curr) {
            if from != side {
                return Some(p);
            }
            curr = p;
        }
        None
    }

    /// Largest key `<= key`.
    pub(crate) fn floor(&self, cmp: &Comparator<K>, key: &K) -> Option<NodeId> {
        let mut best = None;
        let mut curr = self.root;
        while let Some(id) = curr {
            match cmp(key, &self.nodes[id].key) {
                Equal => return Some(id),
                Less => curr = self.nodes[id].left,
                Greater => {
                    best = Some(id);
                    curr = self.nodes[id].right;
                }
            }
        }
        best
    }

    /// Smallest key `>= key`.
    pub(crate) fn ceiling(&self, cmp: &Comparator<K>, key: &K) -> Option<NodeId> {
        let mut best = None;
        let mut curr = self.root;
        while let Some(id) = curr {
            match cmp(key, &self.nodes[id].key) {
                Equal => return Some(id),
                Greater => curr = self.nodes[id].right,
                Less => {
                    best = Some(id);
                    curr = self.nodes[id].left;
                }
            }
        }
        best
    }

    /// Visits entries from `start` onwards, ascending when `side` is
    /// `Right` and descending when it is `Left`, until `f` returns false.
    pub(crate) fn walk<'a, F>(&'a self, start: Option<NodeId>, side: Side, mut f: F)
    where
        F: FnMut(&'a K, &'a V) -> bool,
    {
        let mut curr = start;
        while let Some(id) = curr {
            let n = &self.nodes[id];
            if !f(&n.key, &n.val) {
                return;
            }
            curr = self.step(id, side);
        }
    }

    /// Walks the whole tree, or from the position `from` would occupy:
    /// its ceiling going up, its floor going down.
    pub(crate) fn walk_from<'a, F>(
        &'a self,
        cmp: &Comparator<K>,
        from: Option<&K>,
        desc: bool,
        f: F,
    ) where
        F: FnMut(&'a K, &'a V) -> bool,
    {
        let (start, side) = match (from, desc) {
            (None, false) => (self.first(), Side::Right),
            (None, true) => (self.last(), Side::Left),
            (Some(k), false) => (self.ceiling(cmp, k), Side::Right),
            (Some(k), true) => (self.floor(cmp, k), Side::Left),
        };
        self.walk(start, side, f);
    }

    /// Moves every entry out in ascending order.
    pub(crate) fn into_entries(mut self) -> Vec<(K, V)> {
        let mut ids = Vec::with_capacity(self.len());
        let mut curr = self.first();
        while let Some(id) = curr {
            ids.push(id);
            curr = self.step(id, Side::Right);
        }
        ids.into_iter()
            .map(|id| {
                let n = self.nodes.free(id);
                (n.key, n.val)
            })
            .collect()
    }

    pub(crate) fn height(&self) -> usize {
        self.height_of(self.root)
    }

    pub(crate) fn height_of(&self, id: Option<NodeId>) -> usize {
        id.map_or(0, |id| {
            let n = &self.nodes[id];
            1 + self.height_of(n.left).max(self.height_of(n.right))
        })
    }

    /// Draws the tree sideways: the right subtree above its parent, the
    /// left subtree below.
    pub(crate) fn render(&self, out: &mut impl fmt::Write) -> fmt::Result
    where
        K: Display,
    {
        match self.root {
            None => Ok(()),
            Some(r) => self.render_node(out, r, &mut String::new(), true),
        }
    }

    fn render_node(
        &self,
        out: &mut impl fmt::Write,
        id: NodeId,
        prefix: &mut String,
        is_tail: bool,
    ) -> fmt::Result
    where
        K: Display,
    {
        let n = &self.nodes[id];
        let keep = prefix.len();

        if let Some(r) = n.right {
            prefix.push_str(if is_tail { "│   " } else { "    " });
            self.render_node(out, r, prefix, false)?;
            prefix.truncate(keep);
        }

        let branch = if is_tail { "└── " } else { "┌── " };
        writeln!(out, "{prefix}{branch}{}", n.key)?;

        if let Some(l) = n.left {
            prefix.push_str(if is_tail { "    " } else { "│   " });
            self.render_node(out, l, prefix, true)?;
            prefix.truncate(keep);
        }

        Ok(())
    }

    /// Verifies parent links, strict key order and the node count.
    pub(crate) fn check_links(&self, cmp: &Comparator<K>) -> Result<(), String> {
        let Some(root) = self.root else {
            return if self.len() == 0 {
                Ok(())
            } else {
                Err(format!("empty tree owns {} nodes", self.len()))
            };
        };

        if self.parent(root).is_some() {
            return Err("root has a parent".to_string());
        }

        let mut seen = 0;
        let mut prev: Option<NodeId> = None;
        let mut stack = Vec::new();
        let mut curr = Some(root);
        while curr.is_some() || !stack.is_empty() {
            while let Some(id) = curr {
                for c in [self.nodes[id].left, self.nodes[id].right].into_iter().flatten() {
                    if self.parent(c) != Some(id) {
                        return Err("broken parent link".to_string());
                    }
                }
                stack.push(id);
                curr = self.nodes[id].left;
            }

            let Some(id) = stack.pop() else { break };
            if let Some(p) = prev {
                if cmp(&self.nodes[p].key, &self.nodes[id].key) != Less {
                    return Err("keys out of order".to_string());
                }
            }
            seen += 1;
            prev = Some(id);
            curr = self.nodes[id].right;
        }

        if seen != self.len() {
            return Err(format!("reached {seen} of {} nodes", self.len()));
        }
        Ok(())
    }
}
