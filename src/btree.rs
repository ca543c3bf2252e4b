//! An order-`m` B-tree.
//!
//! Nodes hold between `ceil(m/2) - 1` and `m - 1` entries (the root may hold
//! fewer) and branches hold one more child than entries.  Insertion splits
//! overfull nodes on the way back up; removal repairs underfull nodes by
//! borrowing from a sibling through the parent's separator, or by merging
//! with a sibling.  Nodes own their children outright; the path back to the
//! root is the recursion itself.

use std::fmt::{self, Display};
use std::mem::replace;

use tracing::trace;

use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::guard::{Guarded, Mode, Unguarded};
use crate::tree::sealed::Sealed;
use crate::tree::{Tree, TreeCore};

#[derive(Clone, Debug)]
struct Node<K, V> {
    elems: Vec<(K, V)>,
    kids: Vec<Node<K, V>>,
}

enum InsertResult<K, V> {
    Replaced(V),
    Split(Node<K, V>, K, V),
    Absorbed,
}

struct IsUnderPop(bool);

/// Entry-count bounds for non-root nodes, derived from the order.
#[derive(Clone, Copy, Debug)]
struct Occupancy {
    min: usize,
    max: usize,
}

impl Occupancy {
    fn of_order(m: usize) -> Self {
        Self {
            min: (m - 1) / 2,
            max: m - 1,
        }
    }

    // index of the entry promoted when a node overflows to `max + 1`
    fn middle(self) -> usize {
        self.max / 2
    }
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, val: V) -> Self {
        Node {
            elems: vec![(key, val)],
            kids: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.elems.len()
    }

    fn is_branch(&self) -> bool {
        !self.kids.is_empty()
    }

    fn is_leaf(&self) -> bool {
        self.kids.is_empty()
    }

    fn search(&self, cmp: &Comparator<K>, key: &K) -> Result<usize, usize> {
        self.elems.binary_search_by(|(k, _)| cmp(k, key))
    }

    fn get(&self, cmp: &Comparator<K>, key: &K) -> Option<&(K, V)> {
        match self.search(cmp, key) {
            Ok(i) => Some(&self.elems[i]),
            Err(i) => self.kids.get(i)?.get(cmp, key),
        }
    }

    fn first(&self) -> Option<&(K, V)> {
        match self.kids.first() {
            Some(n) => n.first(),
            None => self.elems.first(),
        }
    }

    fn last(&self) -> Option<&(K, V)> {
        match self.kids.last() {
            Some(n) => n.last(),
            None => self.elems.last(),
        }
    }

    fn insert(&mut self, cmp: &Comparator<K>, key: K, val: V, occ: Occupancy) -> InsertResult<K, V> {
        use InsertResult::*;

        let ub_x = match self.search(cmp, &key) {
            Ok(i) => return Replaced(replace(&mut self.elems[i].1, val)),
            Err(i) => i,
        };

        // A leaf pretends its (absent) child split and handed up the new entry.
        let res = match self.kids.get_mut(ub_x) {
            Some(n) => n.insert(cmp, key, val, occ),
            None => return self.absorb(ub_x, None, key, val, occ),
        };

        match res {
            Split(lhs, k, v) => self.absorb(ub_x, Some(lhs), k, v, occ),
            res => res,
        }
    }

    // takes a separator (and its left subtree) handed up from child `at`
    fn absorb(
        &mut self,
        at: usize,
        lhs: Option<Node<K, V>>,
        key: K,
        val: V,
        occ: Occupancy,
    ) -> InsertResult<K, V> {
        self.elems.insert(at, (key, val));
        if let Some(n) = lhs {
            self.kids.insert(at, n);
        }

        if self.len() <= occ.max {
            return InsertResult::Absorbed;
        }

        self.split(occ)
    }

    // split this overcrowded node, keeping the upper half in place
    fn split(&mut self, occ: Occupancy) -> InsertResult<K, V> {
        debug_assert!(self.len() > occ.max);

        let mid = occ.middle();
        let mut other_elems = self.elems.split_off(mid + 1);
        let mut other_kids = if self.kids.is_empty() {
            Vec::new()
        } else {
            self.kids.split_off(mid + 1)
        };

        // swap the top half into the existing node
        std::mem::swap(&mut self.elems, &mut other_elems);
        std::mem::swap(&mut self.kids, &mut other_kids);

        // the separator is the last of the lower half
        let (mid_k, mid_v) = other_elems
            .pop()
            .expect("split node has a lower half");

        let lhs = Node {
            elems: other_elems,
            kids: other_kids,
        };

        InsertResult::Split(lhs, mid_k, mid_v)
    }

    // moves the first entry of kid `idx + 1` up and separator `idx` down
    fn rot_lf(&mut self, idx: usize) {
        let right = &mut self.kids[idx + 1];
        let (k2, v2) = right.elems.remove(0);
        let k1_to_k2 = if right.is_leaf() {
            None
        } else {
            Some(right.kids.remove(0))
        };

        let old = replace(&mut self.elems[idx], (k2, v2));

        let left = &mut self.kids[idx];
        left.elems.push(old);
        if let Some(n) = k1_to_k2 {
            left.kids.push(n);
        }
    }

    // moves the last entry of kid `idx` up and separator `idx` down
    fn rot_rt(&mut self, idx: usize) {
        let left = &mut self.kids[idx];
        let k0 = left.elems.pop().expect("rotating from an empty child");
        let k0_to_k1 = left.kids.pop();

        let old = replace(&mut self.elems[idx], k0);

        let right = &mut self.kids[idx + 1];
        right.elems.insert(0, old);
        if let Some(n) = k0_to_k1 {
            right.kids.insert(0, n);
        }
    }

    // folds separator `at` and kid `at + 1` into kid `at`
    fn merge_kids(&mut self, at: usize) {
        let sep = self.elems.remove(at);
        let rhs = self.kids.remove(at + 1);

        let lhs = &mut self.kids[at];
        lhs.elems.push(sep);
        lhs.elems.extend(rhs.elems);
        lhs.kids.extend(rhs.kids);
    }

    // repairs kid `at` after it fell below the minimum
    fn rebal(&mut self, at: usize, occ: Occupancy) -> IsUnderPop {
        debug_assert!(self.is_branch(), "cannot rebalance a leaf");

        if at > 0 && self.kids[at - 1].len() > occ.min {
            self.rot_rt(at - 1);
        } else if at + 1 < self.kids.len() && self.kids[at + 1].len() > occ.min {
            self.rot_lf(at);
        } else if at > 0 {
            self.merge_kids(at - 1);
        } else {
            self.merge_kids(at);
        }

        IsUnderPop(self.len() < occ.min)
    }

    fn pop_last(&mut self, occ: Occupancy) -> ((K, V), IsUnderPop) {
        let at = self.len();
        match self.kids.last_mut() {
            Some(rt) => {
                let (kv, IsUnderPop(under)) = rt.pop_last(occ);
                let under = under && self.rebal(at, occ).0;
                (kv, IsUnderPop(under))
            }

            None => {
                let kv = self.elems.pop().expect("non-empty leaf");
                (kv, IsUnderPop(self.len() < occ.min))
            }
        }
    }

    fn remove(&mut self, cmp: &Comparator<K>, key: &K, occ: Occupancy) -> Option<((K, V), IsUnderPop)> {
        match self.search(cmp, key) {
            Ok(i) if self.is_leaf() => {
                let old_kv = self.elems.remove(i);
                Some((old_kv, IsUnderPop(self.len() < occ.min)))
            }

            // replace with the predecessor, the last entry of the left subtree
            Ok(i) => {
                let (kv, IsUnderPop(under)) = self.kids[i].pop_last(occ);
                let old_kv = replace(&mut self.elems[i], kv);
                Some((old_kv, IsUnderPop(under && self.rebal(i, occ).0)))
            }

            Err(i) => {
                let (kv, IsUnderPop(under)) = self.kids.get_mut(i)?.remove(cmp, key, occ)?;
                Some((kv, IsUnderPop(under && self.rebal(i, occ).0)))
            }
        }
    }

    fn floor<'a>(&'a self, cmp: &Comparator<K>, key: &K, best: Option<&'a (K, V)>) -> Option<&'a (K, V)> {
        match self.search(cmp, key) {
            Ok(i) => Some(&self.elems[i]),
            Err(i) => {
                let best = if i > 0 { Some(&self.elems[i - 1]) } else { best };
                match self.kids.get(i) {
                    Some(n) => n.floor(cmp, key, best),
                    None => best,
                }
            }
        }
    }

    fn ceiling<'a>(&'a self, cmp: &Comparator<K>, key: &K, best: Option<&'a (K, V)>) -> Option<&'a (K, V)> {
        match self.search(cmp, key) {
            Ok(i) => Some(&self.elems[i]),
            Err(i) => {
                let best = self.elems.get(i).or(best);
                match self.kids.get(i) {
                    Some(n) => n.ceiling(cmp, key, best),
                    None => best,
                }
            }
        }
    }

    // Both walks return false once `f` asks to stop.

    fn walk_asc<'a, F>(&'a self, cmp: &Comparator<K>, from: Option<&K>, f: &mut F) -> bool
    where
        F: FnMut(&'a K, &'a V) -> bool,
    {
        let (start, descend) = match from.map(|k| self.search(cmp, k)) {
            None => (0, true),
            Some(Ok(i)) => (i, false),
            Some(Err(i)) => (i, true),
        };

        if descend {
            if let Some(n) = self.kids.get(start) {
                if !n.walk_asc(cmp, from, f) {
                    return false;
                }
            }
        }

        for j in start..self.len() {
            let (k, v) = &self.elems[j];
            if !f(k, v) {
                return false;
            }
            if let Some(n) = self.kids.get(j + 1) {
                if !n.walk_asc(cmp, None, f) {
                    return false;
                }
            }
        }

        true
    }

    fn walk_desc<'a, F>(&'a self, cmp: &Comparator<K>, from: Option<&K>, f: &mut F) -> bool
    where
        F: FnMut(&'a K, &'a V) -> bool,
    {
        // entries [..upto] are at or below `from`
        let (upto, descend) = match from.map(|k| self.search(cmp, k)) {
            None => (self.len(), true),
            Some(Ok(i)) => (i + 1, false),
            Some(Err(i)) => (i, true),
        };

        if descend {
            if let Some(n) = self.kids.get(upto) {
                if !n.walk_desc(cmp, from, f) {
                    return false;
                }
            }
        }

        for j in (0..upto).rev() {
            let (k, v) = &self.elems[j];
            if !f(k, v) {
                return false;
            }
            if let Some(n) = self.kids.get(j) {
                if !n.walk_desc(cmp, None, f) {
                    return false;
                }
            }
        }

        true
    }

    fn height(&self) -> usize {
        1 + self.kids.first().map_or(0, Node::height)
    }

    fn render(&self, out: &mut impl fmt::Write, level: usize) -> fmt::Result
    where
        K: Display,
    {
        for e in 0..=self.len() {
            if let Some(n) = self.kids.get(e) {
                n.render(out, level + 1)?;
            }
            if let Some((k, _)) = self.elems.get(e) {
                writeln!(out, "{}{k}", "    ".repeat(level))?;
            }
        }
        Ok(())
    }

    // Checks order, fill and shape below this node; returns its height and
    // entry count.
    fn chk<'a>(
        &'a self,
        cmp: &Comparator<K>,
        occ: Occupancy,
        is_root: bool,
        prev: &mut Option<&'a K>,
    ) -> Result<(usize, usize), String> {
        if self.elems.is_empty() {
            return Err("node without entries".to_string());
        }
        if !is_root && self.len() < occ.min {
            return Err(format!("minimum occupancy violated: {}", self.len()));
        }
        if self.len() > occ.max {
            return Err(format!("maximum occupancy violated: {}", self.len()));
        }
        if self.is_branch() && self.kids.len() != self.len() + 1 {
            return Err("branch with a wrong child count".to_string());
        }

        let mut ht = None;
        let mut count = self.len();
        for e in 0..=self.len() {
            if let Some(n) = self.kids.get(e) {
                let (h, c) = n.chk(cmp, occ, false, prev)?;
                if *ht.get_or_insert(h) != h {
                    return Err("uneven branches".to_string());
                }
                count += c;
            }
            if let Some((k, _)) = self.elems.get(e) {
                if prev.is_some_and(|p| cmp(p, k) != std::cmp::Ordering::Less) {
                    return Err("order violation".to_string());
                }
                *prev = Some(k);
            }
        }

        Ok((ht.unwrap_or(0) + 1, count))
    }
}

/// Storage and balancing for [`BTree`](crate::BTree).
#[derive(Clone, Debug)]
pub struct BTreeCore<K, V> {
    root: Option<Node<K, V>>,
    len: usize,
    order: usize,
}

impl<K, V> BTreeCore<K, V> {
    pub(crate) fn new(order: usize) -> Self {
        assert!(order >= 3, "b-tree order must be at least 3, got {order}");
        Self {
            root: None,
            len: 0,
            order,
        }
    }

    pub(crate) fn order(&self) -> usize {
        self.order
    }

    fn occupancy(&self) -> Occupancy {
        Occupancy::of_order(self.order)
    }
}

/// A B-tree whose nodes have at most `order` children.
///
/// See [`Tree`] for the operations.  `M` selects the concurrency mode.
pub type BTree<K, V, M = Unguarded> = Tree<BTreeCore<K, V>, M>;

fn valid_order(order: usize) -> Result<usize> {
    if order < 3 {
        return Err(Error::InvalidOrder { order });
    }
    Ok(order)
}

impl<K, V> BTree<K, V> {
    /// An empty tree without locking.
    ///
    /// # Panics
    ///
    /// If `order` is below 3.
    pub fn new(order: usize, cmp: Comparator<K>) -> Self {
        Tree::from_parts(BTreeCore::new(order), cmp)
    }

    /// Like [`new`](Self::new), but reports a bad order instead of panicking.
    pub fn try_new(order: usize, cmp: Comparator<K>) -> Result<Self> {
        Ok(Self::new(valid_order(order)?, cmp))
    }

    /// An unlocked tree holding `entries`; later duplicates overwrite.
    ///
    /// # Panics
    ///
    /// If `order` is below 3.
    pub fn new_from<I>(order: usize, cmp: Comparator<K>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let tree = Self::new(order, cmp);
        tree.sets(entries);
        tree
    }
}

impl<K, V> BTree<K, V, Guarded> {
    /// An empty tree that locks around every operation.
    ///
    /// # Panics
    ///
    /// If `order` is below 3.
    pub fn new_safe(order: usize, cmp: Comparator<K>) -> Self {
        Tree::from_parts(BTreeCore::new(order), cmp)
    }

    /// Like [`new_safe`](Self::new_safe), but reports a bad order instead
    /// of panicking.
    pub fn try_new_safe(order: usize, cmp: Comparator<K>) -> Result<Self> {
        Ok(Self::new_safe(valid_order(order)?, cmp))
    }

    /// Like [`new_from`](BTree::new_from), but locking.
    pub fn new_safe_from<I>(order: usize, cmp: Comparator<K>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let tree = Self::new_safe(order, cmp);
        tree.sets(entries);
        tree
    }
}

impl<K, V, M: Mode> BTree<K, V, M> {
    /// The maximum number of children per node.
    pub fn order(&self) -> usize {
        self.with_state(|s| s.core.order())
    }

    /// A new tree of the same order mapping every value to its key, ordered
    /// by `cmp`.  When several keys share a value, the largest key wins.
    pub fn flip(&self, cmp: Comparator<V>) -> BTree<V, K, M>
    where
        K: Clone,
        V: Clone,
    {
        self.flip_into(BTreeCore::new(self.order()), cmp)
    }
}

impl<K, V> Sealed for BTreeCore<K, V> {}

impl<K, V> TreeCore for BTreeCore<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    fn get(&self, cmp: &Comparator<K>, key: &K) -> Option<(&K, &V)> {
        let (k, v) = self.root.as_ref()?.get(cmp, key)?;
        Some((k, v))
    }

    fn insert(&mut self, cmp: &Comparator<K>, key: K, val: V) -> Option<V> {
        let occ = self.occupancy();
        let Some(r) = self.root.as_mut() else {
            self.len = 1;
            self.root = Some(Node::leaf(key, val));
            return None;
        };

        match r.insert(cmp, key, val, occ) {
            InsertResult::Replaced(v) => Some(v),

            InsertResult::Split(lhs, k, v) => {
                self.len += 1;
                let rhs = self.root.take().expect("split came from the root");
                self.root = Some(Node {
                    elems: vec![(k, v)],
                    kids: vec![lhs, rhs],
                });
                trace!(order = self.order, height = self.height(), "b-tree root split");
                None
            }

            InsertResult::Absorbed => {
                self.len += 1;
                None
            }
        }
    }

    fn remove(&mut self, cmp: &Comparator<K>, key: &K) -> Option<(K, V)> {
        let occ = self.occupancy();
        let n = self.root.as_mut()?;
        let (old_kv, IsUnderPop(under)) = n.remove(cmp, key, occ)?;

        self.len -= 1;

        if under && n.elems.is_empty() {
            debug_assert!(n.kids.len() <= 1);
            self.root = n.kids.pop();
            if self.root.is_some() {
                trace!(order = self.order, height = self.height(), "b-tree root collapsed");
            }
        }

        Some(old_kv)
    }

    fn first(&self) -> Option<(&K, &V)> {
        let (k, v) = self.root.as_ref()?.first()?;
        Some((k, v))
    }

    fn last(&self) -> Option<(&K, &V)> {
        let (k, v) = self.root.as_ref()?.last()?;
        Some((k, v))
    }

    fn floor(&self, cmp: &Comparator<K>, key: &K) -> Option<(&K, &V)> {
        let (k, v) = self.root.as_ref()?.floor(cmp, key, None)?;
        Some((k, v))
    }

    fn ceiling(&self, cmp: &Comparator<K>, key: &K) -> Option<(&K, &V)> {
        let (k, v) = self.root.as_ref()?.ceiling(cmp, key, None)?;
        Some((k, v))
    }

    fn walk<'a, F>(&'a self, cmp: &Comparator<K>, from: Option<&K>, desc: bool, mut f: F)
    where
        F: FnMut(&'a K, &'a V) -> bool,
    {
        if let Some(r) = self.root.as_ref() {
            if desc {
                r.walk_desc(cmp, from, &mut f);
            } else {
                r.walk_asc(cmp, from, &mut f);
            }
        }
    }

    fn height(&self) -> usize {
        self.root.as_ref().map_or(0, Node::height)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        K: Display,
    {
        match self.root.as_ref() {
            Some(r) => r.render(f, 0),
            None => Ok(()),
        }
    }

    fn check(&self, cmp: &Comparator<K>) -> Result<(), String> {
        let count = match self.root.as_ref() {
            Some(r) => r.chk(cmp, self.occupancy(), true, &mut None)?.1,
            None => 0,
        };
        if count != self.len {
            return Err(format!("counted {count} entries, expected {}", self.len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    extern crate quickcheck;
    use super::*;
    use crate::comparator::natural;
    use quickcheck::quickcheck;
    use std::collections::BTreeMap;

    fn chk(core: &BTreeCore<u16, u32>) {
        if let Err(e) = core.check(&natural()) {
            panic!("order {}: {e}", core.order());
        }
    }

    fn keys(core: &BTreeCore<u16, u32>, desc: bool) -> Vec<u16> {
        let mut out = Vec::new();
        core.walk(&natural(), None, desc, |k, _| {
            out.push(*k);
            true
        });
        out
    }

    // (true, k) inserts k, (false, k) removes it
    fn ops_test(order: usize, ops: &[(bool, u16)]) {
        let cmp = natural();
        let mut core = BTreeCore::new(order);
        let mut btree = BTreeMap::new();

        for (i, &(ins, k)) in ops.iter().enumerate() {
            let k = k % 128;
            if ins {
                assert_eq!(core.insert(&cmp, k, i as u32), btree.insert(k, i as u32));
            } else {
                assert_eq!(core.remove(&cmp, &k).map(|(_, v)| v), btree.remove(&k));
            }
            chk(&core);
        }

        assert_eq!(keys(&core, false), btree.keys().copied().collect::<Vec<_>>());
        assert_eq!(keys(&core, true), btree.keys().rev().copied().collect::<Vec<_>>());
    }

    #[test]
    fn occupancy_bounds() {
        let o = Occupancy::of_order(3);
        assert_eq!((o.min, o.max, o.middle()), (1, 2, 1));
        let o = Occupancy::of_order(4);
        assert_eq!((o.min, o.max, o.middle()), (1, 3, 1));
        let o = Occupancy::of_order(5);
        assert_eq!((o.min, o.max, o.middle()), (2, 4, 2));
    }

    #[test]
    fn root_splits_and_collapses() {
        let cmp = natural();
        let mut core = BTreeCore::new(3);
        for k in 1..=10 {
            core.insert(&cmp, k, 0);
            chk(&core);
        }
        assert!(core.height() > 1);

        for k in 1..=10 {
            assert_eq!(core.remove(&cmp, &k), Some((k, 0)));
            chk(&core);
        }
        assert_eq!(core.height(), 0);
        assert!(core.root.is_none());
    }

    #[test]
    fn rm_each_test() {
        let cmp = natural();
        for order in [3, 4, 5, 8] {
            let mut base = BTreeCore::new(order);
            for k in 0..64 {
                base.insert(&cmp, k, k as u32);
            }

            for k in 0..64 {
                let mut core = base.clone();
                assert_eq!(core.remove(&cmp, &k), Some((k, k as u32)));
                assert_eq!(core.remove(&cmp, &k), None);
                chk(&core);
            }
        }
    }

    #[test]
    fn floor_and_ceiling_cross_nodes() {
        let cmp = natural();
        let mut core = BTreeCore::new(3);
        for k in (0..100).step_by(10) {
            core.insert(&cmp, k, 0);
        }

        for probe in 0..=100u16 {
            let floor = (probe <= 90).then(|| probe / 10 * 10).or(Some(90));
            let ceil = (probe <= 90).then(|| (probe + 9) / 10 * 10);
            assert_eq!(core.floor(&cmp, &probe).map(|(k, _)| *k), floor);
            assert_eq!(core.ceiling(&cmp, &probe).map(|(k, _)| *k), ceil);
        }
    }

    #[test]
    fn walks_from_inside() {
        let cmp = natural();
        let mut core = BTreeCore::new(4);
        for k in (0..40).step_by(2) {
            core.insert(&cmp, k, 0);
        }

        let mut asc = Vec::new();
        core.walk(&cmp, Some(&13), false, |k, _| {
            asc.push(*k);
            *k < 20
        });
        assert_eq!(asc, vec![14, 16, 18, 20]);

        let mut desc = Vec::new();
        core.walk(&cmp, Some(&8), true, |k, _| {
            desc.push(*k);
            true
        });
        assert_eq!(desc, vec![8, 6, 4, 2, 0]);
    }

    #[test]
    fn renders_rows() {
        let cmp = natural();
        let mut core = BTreeCore::new(3);
        for k in 1..=3 {
            core.insert(&cmp, k, 0);
        }

        struct Show<'a>(&'a BTreeCore<u16, u32>);
        impl std::fmt::Display for Show<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.render(f)
            }
        }
        assert_eq!(Show(&core).to_string(), "    1\n2\n    3\n");
    }

    quickcheck! {
        fn qc_ops_order3(ops: Vec<(bool, u16)>) -> () {
            ops_test(3, &ops);
        }

        fn qc_ops_order4(ops: Vec<(bool, u16)>) -> () {
            ops_test(4, &ops);
        }

        fn qc_ops_order7(ops: Vec<(bool, u16)>) -> () {
            ops_test(7, &ops);
        }
    }
}
