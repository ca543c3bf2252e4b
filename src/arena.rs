use std::ops::{Index, IndexMut};

/// Handle to a node stored in an [`Arena`].
///
/// Handles are plain indices: holding one neither owns nor keeps alive the
/// node it names, which is what lets parent links point "up" without forming
/// ownership cycles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeId(u32);

impl NodeId {
    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Owns every node of one tree.  Freed slots are recycled.
#[derive(Clone, Debug)]
pub(crate) struct Arena<N> {
    slots: Vec<Option<N>>,
    free: Vec<NodeId>,
}

impl<N> Arena<N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn alloc(&mut self, node: N) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                debug_assert!(self.slots[id.slot()].is_none());
                self.slots[id.slot()] = Some(node);
                id
            }

            None => {
                let id = u32::try_from(self.slots.len())
                    .map(NodeId)
                    .expect("arena exhausted the u32 id space");
                self.slots.push(Some(node));
                id
            }
        }
    }

    /// Removes the node, returning it and making its slot reusable.
    pub(crate) fn free(&mut self, id: NodeId) -> N {
        let node = self.slots[id.slot()]
            .take()
            .expect("freeing a vacant arena slot");
        self.free.push(id);
        node
    }

    /// Mutable access to two distinct nodes at once.
    pub(crate) fn pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut N, &mut N) {
        assert_ne!(a, b, "pair_mut on a single node");
        let (lo, hi) = if a.0 < b.0 { (a, b) } else { (b, a) };
        let (head, tail) = self.slots.split_at_mut(hi.slot());
        let lo_node = head[lo.slot()].as_mut().expect("dangling node id");
        let hi_node = tail[0].as_mut().expect("dangling node id");
        if a == lo {
            (lo_node, hi_node)
        } else {
            (hi_node, lo_node)
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

impl<N> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Index<NodeId> for Arena<N> {
    type Output = N;

    fn index(&self, id: NodeId) -> &N {
        self.slots[id.slot()]
            .as_ref()
            .expect("dangling node id")
    }
}

impl<N> IndexMut<NodeId> for Arena<N> {
    fn index_mut(&mut self, id: NodeId) -> &mut N {
        self.slots[id.slot()]
            .as_mut()
            .expect("dangling node id")
    }
}
