//! # Ordered maps over caller-defined key orderings
//!
//! `ordered-trees` provides three interchangeable self-balancing search
//! trees behind one ordered-map surface, [`Tree`]:
//!
//! * [`AvlTree`]: height-balanced binary tree, the shallowest of the three.
//! * [`RedBlackTree`]: binary tree with cheaper rebalancing on update; it
//!   alone can change its ordering after construction
//!   ([`set_comparator`](Tree::set_comparator)).
//! * [`BTree`]: multi-way tree of a configurable order.
//!
//! Keys are ordered by a [`Comparator`] supplied at construction, never by
//! an `Ord` implementation the key happens to have.  Every operation takes
//! `&self`.  The concurrency mode is part of the type: trees built with
//! `new` are [`Unguarded`] (no locking, not `Sync`), trees built with
//! `new_safe` are [`Guarded`] by a reader/writer lock and can be shared
//! between threads.
//!
//! ```
//! use ordered_trees::{comparator, RedBlackTree};
//!
//! let t = RedBlackTree::new(comparator::natural());
//! t.sets([(5, "e"), (3, "c"), (8, "h")]);
//!
//! assert_eq!(t.floor(&6), Some((5, "e")));
//! assert_eq!(t.ceiling(&6), Some((8, "h")));
//! assert_eq!(t.marshal_json().unwrap(), br#"{"3":"c","5":"e","8":"h"}"#);
//! ```

mod arena;
mod binary;

pub mod comparator;
pub use comparator::Comparator;

mod error;
pub use error::{Error, Result};

pub mod guard;
pub use guard::{Guard, Guarded, Mode, Unguarded};

mod tree;
pub use tree::{Tree, TreeCore};

mod avl;
pub use avl::{AvlCore, AvlTree};

mod red_black;
pub use red_black::{RbCore, RedBlackTree};

mod btree;
pub use btree::{BTree, BTreeCore};
