//! The ordered-map surface shared by every tree variant.
//!
//! [`Tree`] pairs a variant's storage (its *core*) with the comparator that
//! orders it, and keeps both in the cell selected by the tree's [`Mode`].
//! Every public operation goes through that cell exactly once, so in
//! guarded mode each call (including a whole iteration) is one critical
//! section.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::marker::PhantomData;

use serde::de::{self, Deserialize, DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::comparator::Comparator;
use crate::guard::{Guard, Mode, Unguarded};

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Storage and balancing for one tree variant: [`AvlCore`](crate::AvlCore),
/// [`RbCore`](crate::RbCore) or [`BTreeCore`](crate::BTreeCore).
///
/// Cores never lock and never own their comparator; [`Tree`] hands it in on
/// every call.  The trait is sealed and its methods are internal.
pub trait TreeCore: sealed::Sealed {
    type Key;
    type Value;

    #[doc(hidden)]
    fn len(&self) -> usize;

    #[doc(hidden)]
    fn clear(&mut self);

    #[doc(hidden)]
    fn get(&self, cmp: &Comparator<Self::Key>, key: &Self::Key)
        -> Option<(&Self::Key, &Self::Value)>;

    /// Inserts or overwrites, returning the replaced value.
    #[doc(hidden)]
    fn insert(
        &mut self,
        cmp: &Comparator<Self::Key>,
        key: Self::Key,
        val: Self::Value,
    ) -> Option<Self::Value>;

    #[doc(hidden)]
    fn remove(
        &mut self,
        cmp: &Comparator<Self::Key>,
        key: &Self::Key,
    ) -> Option<(Self::Key, Self::Value)>;

    #[doc(hidden)]
    fn first(&self) -> Option<(&Self::Key, &Self::Value)>;

    #[doc(hidden)]
    fn last(&self) -> Option<(&Self::Key, &Self::Value)>;

    #[doc(hidden)]
    fn floor(&self, cmp: &Comparator<Self::Key>, key: &Self::Key)
        -> Option<(&Self::Key, &Self::Value)>;

    #[doc(hidden)]
    fn ceiling(&self, cmp: &Comparator<Self::Key>, key: &Self::Key)
        -> Option<(&Self::Key, &Self::Value)>;

    /// Visits entries in key order (descending when `desc`) until `f`
    /// returns false.  With `from`, starts where that key would sit: at its
    /// ceiling ascending, at its floor descending.
    #[doc(hidden)]
    fn walk<'a, F>(
        &'a self,
        cmp: &Comparator<Self::Key>,
        from: Option<&Self::Key>,
        desc: bool,
        f: F,
    ) where
        F: FnMut(&'a Self::Key, &'a Self::Value) -> bool;

    #[doc(hidden)]
    fn height(&self) -> usize;

    #[doc(hidden)]
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self::Key: Display;

    #[doc(hidden)]
    fn check(&self, cmp: &Comparator<Self::Key>) -> Result<(), String>;
}

pub(crate) struct State<C: TreeCore> {
    pub(crate) core: C,
    pub(crate) cmp: Comparator<C::Key>,
}

/// An ordered map over a caller-supplied key ordering.
///
/// Use it through the [`AvlTree`](crate::AvlTree),
/// [`RedBlackTree`](crate::RedBlackTree) and [`BTree`](crate::BTree)
/// aliases.  All operations take `&self`; `M` decides whether they lock.
///
/// Lookups return clones of the stored keys and values, so no borrow of the
/// tree's interior ever escapes a call.
pub struct Tree<C: TreeCore, M: Mode = Unguarded> {
    state: M::Cell<State<C>>,
}

impl<C: TreeCore, M: Mode> Tree<C, M> {
    pub(crate) fn from_parts(core: C, cmp: Comparator<C::Key>) -> Self {
        Self {
            state: Guard::new(State { core, cmp }),
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&State<C>) -> R) -> R {
        self.state.read(f)
    }

    pub(crate) fn with_state_mut<R>(&self, f: impl FnOnce(&mut State<C>) -> R) -> R {
        self.state.write(f)
    }

    /// Whether this tree locks around its operations.
    pub fn is_safe(&self) -> bool {
        M::SAFE
    }

    /// The comparator ordering this tree.
    pub fn comparator(&self) -> Comparator<C::Key> {
        self.with_state(|s| s.cmp.clone())
    }

    /// Inserts `key`, overwriting the value of an equal key already present.
    pub fn set(&self, key: C::Key, val: C::Value) {
        self.with_state_mut(|s| {
            s.core.insert(&s.cmp, key, val);
        })
    }

    /// Inserts every entry under a single lock acquisition.
    pub fn sets<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (C::Key, C::Value)>,
    {
        self.with_state_mut(|s| {
            for (k, v) in entries {
                s.core.insert(&s.cmp, k, v);
            }
        })
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &C::Key) -> Option<C::Value>
    where
        C::Value: Clone,
    {
        self.with_state(|s| s.core.get(&s.cmp, key).map(|(_, v)| v.clone()))
    }

    /// The stored entry equal to `key`.  The stored key may differ from
    /// `key` when the comparator treats distinct keys as equal.
    pub fn search(&self, key: &C::Key) -> Option<(C::Key, C::Value)>
    where
        C::Key: Clone,
        C::Value: Clone,
    {
        self.with_state(|s| s.core.get(&s.cmp, key).map(cloned))
    }

    /// Whether an entry equal to `key` is stored.
    pub fn contains(&self, key: &C::Key) -> bool {
        self.with_state(|s| s.core.get(&s.cmp, key).is_some())
    }

    // inserts `make()` unless `key` is present; returns the stored value
    fn get_or_insert_with(&self, key: C::Key, make: impl FnOnce() -> C::Value) -> C::Value
    where
        C::Value: Clone,
    {
        fn stored<C: TreeCore>(s: &State<C>, key: &C::Key) -> Option<C::Value>
        where
            C::Value: Clone,
        {
            s.core.get(&s.cmp, key).map(|(_, v)| v.clone())
        }

        self.state.write_with(key, stored::<C>, make, |s, key, v| {
            if let Some(old) = stored(s, &key) {
                return old;
            }
            s.core.insert(&s.cmp, key, v.clone());
            v
        })
    }

    /// Returns the value of `key`, first inserting `val` if it is absent.
    pub fn get_or_set(&self, key: C::Key, val: C::Value) -> C::Value
    where
        C::Value: Clone,
    {
        match self.get(&key) {
            Some(v) => v,
            None => self.get_or_insert_with(key, || val),
        }
    }

    /// Like [`get_or_set`](Self::get_or_set) with a computed value.
    ///
    /// `f` runs outside the lock, so concurrent callers missing the same key
    /// may each run it; only the first to take the lock stores its value.
    pub fn get_or_set_func<F>(&self, key: C::Key, f: F) -> C::Value
    where
        C::Value: Clone,
        F: FnOnce() -> C::Value,
    {
        match self.get(&key) {
            Some(v) => v,
            None => {
                let val = f();
                self.get_or_insert_with(key, || val)
            }
        }
    }

    /// Like [`get_or_set_func`](Self::get_or_set_func), but runs `f` while
    /// holding the exclusive lock: `f` runs at most once per absent key.
    ///
    /// An unguarded tree has no lock to hold, so `f` runs with the tree
    /// free and may read or write it.  If `f` stores `key` itself, that
    /// value wins and is returned.
    pub fn get_or_set_func_lock<F>(&self, key: C::Key, f: F) -> C::Value
    where
        C::Value: Clone,
        F: FnOnce() -> C::Value,
    {
        match self.get(&key) {
            Some(v) => v,
            None => self.get_or_insert_with(key, f),
        }
    }

    // inserts `make()` if `key` is absent; reports whether it did
    fn insert_absent_with(&self, key: C::Key, make: impl FnOnce() -> C::Value) -> bool {
        fn present<C: TreeCore>(s: &State<C>, key: &C::Key) -> Option<bool> {
            s.core.get(&s.cmp, key).map(|_| false)
        }

        self.state.write_with(key, present::<C>, make, |s, key, v| {
            if present(s, &key).is_some() {
                return false;
            }
            s.core.insert(&s.cmp, key, v);
            true
        })
    }

    /// Inserts `val` only if `key` is absent.  Returns whether it did.
    pub fn set_if_not_exist(&self, key: C::Key, val: C::Value) -> bool {
        !self.contains(&key) && self.insert_absent_with(key, || val)
    }

    /// Like [`set_if_not_exist`](Self::set_if_not_exist); `f` runs outside
    /// the lock and its value is dropped if another caller got there first.
    pub fn set_if_not_exist_func<F>(&self, key: C::Key, f: F) -> bool
    where
        F: FnOnce() -> C::Value,
    {
        if self.contains(&key) {
            return false;
        }
        let val = f();
        self.insert_absent_with(key, || val)
    }

    /// Like [`set_if_not_exist_func`](Self::set_if_not_exist_func), but `f`
    /// runs under the exclusive lock and only when the key is absent.
    ///
    /// On an unguarded tree `f` may use the tree; if it stores `key`, its
    /// value is kept and this returns false.
    pub fn set_if_not_exist_func_lock<F>(&self, key: C::Key, f: F) -> bool
    where
        F: FnOnce() -> C::Value,
    {
        !self.contains(&key) && self.insert_absent_with(key, f)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &C::Key) -> Option<C::Value> {
        self.with_state_mut(|s| s.core.remove(&s.cmp, key).map(|(_, v)| v))
    }

    /// Removes every listed key under one lock acquisition, returning the
    /// values that were present.
    pub fn removes<I>(&self, keys: I) -> Vec<C::Value>
    where
        I: IntoIterator,
        I::Item: Borrow<C::Key>,
    {
        self.with_state_mut(|s| {
            keys.into_iter()
                .filter_map(|k| s.core.remove(&s.cmp, k.borrow()).map(|(_, v)| v))
                .collect()
        })
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.with_state(|s| s.core.len())
    }

    /// Same as [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Whether the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> usize {
        self.with_state(|s| s.core.height())
    }

    fn collect<T>(&self, mut f: impl FnMut(&C::Key, &C::Value) -> T) -> Vec<T> {
        self.with_state(|s| {
            let mut out = Vec::with_capacity(s.core.len());
            s.core.walk(&s.cmp, None, false, |k, v| {
                out.push(f(k, v));
                true
            });
            out
        })
    }

    /// All keys, ascending.
    pub fn keys(&self) -> Vec<C::Key>
    where
        C::Key: Clone,
    {
        self.collect(|k, _| k.clone())
    }

    /// All values, in ascending key order.
    pub fn values(&self) -> Vec<C::Value>
    where
        C::Value: Clone,
    {
        self.collect(|_, v| v.clone())
    }

    /// All entries, ascending.
    pub fn entries(&self) -> Vec<(C::Key, C::Value)>
    where
        C::Key: Clone,
        C::Value: Clone,
    {
        self.collect(|k, v| (k.clone(), v.clone()))
    }

    /// A snapshot as a hash map.
    pub fn map(&self) -> HashMap<C::Key, C::Value>
    where
        C::Key: Clone + Hash + Eq,
        C::Value: Clone,
    {
        self.entries().into_iter().collect()
    }

    /// A snapshot as a JSON object, keys rendered with [`Display`].
    pub fn map_str_any(&self) -> crate::Result<serde_json::Map<String, serde_json::Value>>
    where
        C::Key: Display,
        C::Value: Serialize,
    {
        self.with_state(|s| {
            let mut out = serde_json::Map::new();
            let mut res = Ok(());
            s.core.walk(&s.cmp, None, false, |k, v| {
                match serde_json::to_value(v) {
                    Ok(v) => {
                        out.insert(k.to_string(), v);
                    }
                    Err(e) => res = Err(e),
                }
                res.is_ok()
            });
            res?;
            Ok(out)
        })
    }

    /// Removes every entry, keeping the comparator.
    pub fn clear(&self) {
        self.with_state_mut(|s| {
            debug!(dropped = s.core.len(), "tree cleared");
            s.core.clear();
        })
    }

    /// Swaps the whole content for `entries` in one critical section.
    pub fn replace<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (C::Key, C::Value)>,
    {
        self.with_state_mut(|s| {
            let dropped = s.core.len();
            s.core.clear();
            for (k, v) in entries {
                s.core.insert(&s.cmp, k, v);
            }
            debug!(dropped, len = s.core.len(), "tree replaced");
        })
    }

    /// Same as [`iterator_asc`](Self::iterator_asc).
    pub fn iterator<F>(&self, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.iterator_asc(f)
    }

    /// Visits entries in ascending order until `f` returns false.
    pub fn iterator_asc<F>(&self, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.with_state(|s| s.core.walk(&s.cmp, None, false, f))
    }

    /// Visits entries in descending order until `f` returns false.
    pub fn iterator_desc<F>(&self, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.with_state(|s| s.core.walk(&s.cmp, None, true, f))
    }

    /// Same as [`iterator_asc_from`](Self::iterator_asc_from).
    pub fn iterator_from<F>(&self, key: &C::Key, exact_match_only: bool, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.iterator_asc_from(key, exact_match_only, f)
    }

    /// Ascending visit starting at `key`, or at the next larger key when
    /// `key` is absent.  With `exact_match_only`, an absent key visits
    /// nothing.
    pub fn iterator_asc_from<F>(&self, key: &C::Key, exact_match_only: bool, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.walk_from(key, exact_match_only, false, f)
    }

    /// Descending visit starting at `key`, or at the next smaller key when
    /// `key` is absent.  With `exact_match_only`, an absent key visits
    /// nothing.
    pub fn iterator_desc_from<F>(&self, key: &C::Key, exact_match_only: bool, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.walk_from(key, exact_match_only, true, f)
    }

    fn walk_from<F>(&self, key: &C::Key, exact_match_only: bool, desc: bool, f: F)
    where
        F: FnMut(&C::Key, &C::Value) -> bool,
    {
        self.with_state(|s| {
            if exact_match_only && s.core.get(&s.cmp, key).is_none() {
                return;
            }
            s.core.walk(&s.cmp, Some(key), desc, f)
        })
    }

    /// The entry with the largest key `<= key`.
    pub fn floor(&self, key: &C::Key) -> Option<(C::Key, C::Value)>
    where
        C::Key: Clone,
        C::Value: Clone,
    {
        self.with_state(|s| s.core.floor(&s.cmp, key).map(cloned))
    }

    /// The entry with the smallest key `>= key`.
    pub fn ceiling(&self, key: &C::Key) -> Option<(C::Key, C::Value)>
    where
        C::Key: Clone,
        C::Value: Clone,
    {
        self.with_state(|s| s.core.ceiling(&s.cmp, key).map(cloned))
    }

    /// The entry with the smallest key.
    pub fn left(&self) -> Option<(C::Key, C::Value)>
    where
        C::Key: Clone,
        C::Value: Clone,
    {
        self.with_state(|s| s.core.first().map(cloned))
    }

    /// The entry with the largest key.
    pub fn right(&self) -> Option<(C::Key, C::Value)>
    where
        C::Key: Clone,
        C::Value: Clone,
    {
        self.with_state(|s| s.core.last().map(cloned))
    }

    /// Validates the variant's structural invariants and the key order.
    pub fn check(&self) -> Result<(), String> {
        self.with_state(|s| s.core.check(&s.cmp))
    }

    /// An independent copy using another concurrency mode.
    pub fn clone_with<M2: Mode>(&self) -> Tree<C, M2>
    where
        C: Clone,
    {
        self.with_state(|s| {
            debug!(len = s.core.len(), safe = M2::SAFE, "tree cloned");
            Tree::from_parts(s.core.clone(), s.cmp.clone())
        })
    }

    // builds a value-keyed tree into the empty `core`
    pub(crate) fn flip_into<D>(&self, mut core: D, cmp: Comparator<C::Value>) -> Tree<D, M>
    where
        D: TreeCore<Key = C::Value, Value = C::Key>,
        C::Key: Clone,
        C::Value: Clone,
    {
        self.with_state(|s| {
            s.core.walk(&s.cmp, None, false, |k, v| {
                core.insert(&cmp, v.clone(), k.clone());
                true
            });
            debug!(len = s.core.len(), flipped = core.len(), "tree flipped");
        });
        Tree::from_parts(core, cmp)
    }

    /// Encodes the tree as a JSON object in ascending key order, or `null`
    /// when empty.
    pub fn marshal_json(&self) -> crate::Result<Vec<u8>>
    where
        C::Key: Serialize,
        C::Value: Serialize,
    {
        Ok(serde_json::to_vec(self)?)
    }

    /// Sets every entry of a JSON object; `null` sets nothing.
    ///
    /// The document is decoded in full before the tree is touched, so a
    /// malformed document or an unconvertible key or value leaves the tree
    /// unchanged.
    pub fn unmarshal_json(&self, bytes: &[u8]) -> crate::Result<()>
    where
        C::Key: DeserializeOwned,
        C::Value: DeserializeOwned,
    {
        let Entries(entries): Entries<C::Key, C::Value> = serde_json::from_slice(bytes)?;

        self.with_state_mut(|s| {
            let before = s.core.len();
            for (k, v) in entries {
                s.core.insert(&s.cmp, k, v);
            }
            debug!(added = s.core.len() - before, len = s.core.len(), "tree unmarshaled");
        });
        Ok(())
    }
}

impl<C: TreeCore, M: Mode> Tree<C, M> {
    // decodes a JSON object (or `null`) into a tree built on `core`
    pub(crate) fn deserialize_with<'de, D>(
        deserializer: D,
        core: C,
        cmp: Comparator<C::Key>,
    ) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
        C::Key: Deserialize<'de>,
        C::Value: Deserialize<'de>,
    {
        let Entries(entries) = Entries::deserialize(deserializer)?;
        let tree = Self::from_parts(core, cmp);
        tree.sets(entries);
        Ok(tree)
    }
}

fn cloned<K: Clone, V: Clone>((k, v): (&K, &V)) -> (K, V) {
    (k.clone(), v.clone())
}

impl<C: TreeCore + Clone, M: Mode> Clone for Tree<C, M> {
    fn clone(&self) -> Self {
        self.with_state(|s| Tree::from_parts(s.core.clone(), s.cmp.clone()))
    }
}

/// Trees are equal when they hold equal entries in the same order.
impl<C, M> PartialEq for Tree<C, M>
where
    C: TreeCore,
    C::Key: PartialEq,
    C::Value: PartialEq,
    M: Mode,
{
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        self.with_state(|a| {
            other.with_state(|b| {
                if a.core.len() != b.core.len() {
                    return false;
                }
                let mut lhs = Vec::with_capacity(a.core.len());
                a.core.walk(&a.cmp, None, false, |k, v| {
                    lhs.push((k, v));
                    true
                });
                let mut lhs = lhs.into_iter();
                let mut same = true;
                b.core.walk(&b.cmp, None, false, |k, v| {
                    same = lhs.next().is_some_and(|(lk, lv)| lk == k && lv == v);
                    same
                });
                same
            })
        })
    }
}

impl<C: TreeCore, M: Mode> Extend<(C::Key, C::Value)> for Tree<C, M> {
    fn extend<I: IntoIterator<Item = (C::Key, C::Value)>>(&mut self, iter: I) {
        let s = self.state.get_mut();
        for (k, v) in iter {
            s.core.insert(&s.cmp, k, v);
        }
    }
}

impl<C, M> Display for Tree<C, M>
where
    C: TreeCore,
    C::Key: Display,
    M: Mode,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_state(|s| s.core.render(f))
    }
}

impl<C, M> Debug for Tree<C, M>
where
    C: TreeCore,
    C::Key: Debug,
    C::Value: Debug,
    M: Mode,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_state(|s| {
            let mut m = f.debug_map();
            s.core.walk(&s.cmp, None, false, |k, v| {
                m.entry(k, v);
                true
            });
            m.finish()
        })
    }
}

impl<C, M> Serialize for Tree<C, M>
where
    C: TreeCore,
    C::Key: Serialize,
    C::Value: Serialize,
    M: Mode,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.with_state(|s| {
            if s.core.len() == 0 {
                return serializer.serialize_none();
            }

            let mut map = serializer.serialize_map(Some(s.core.len()))?;
            let mut res = Ok(());
            s.core.walk(&s.cmp, None, false, |k, v| {
                res = map.serialize_entry(k, v);
                res.is_ok()
            });
            res?;
            map.end()
        })
    }
}

/// The entries of a map in document order; `null` decodes as no entries.
pub(crate) struct Entries<K, V>(pub(crate) Vec<(K, V)>);

struct EntriesVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for EntriesVisitor<K, V>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    type Value = Entries<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of tree entries or null")
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Entries(Vec::new()))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Entries(Vec::new()))
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(kv) = access.next_entry()? {
            entries.push(kv);
        }
        Ok(Entries(entries))
    }
}

impl<'de, K, V> Deserialize<'de> for Entries<K, V>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(EntriesVisitor(PhantomData))
    }
}
