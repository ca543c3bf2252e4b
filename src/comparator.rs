use std::cmp::Ordering;
use std::sync::Arc;

/// A total order over keys.
///
/// Every placement decision a tree makes goes through its comparator; keys
/// never need to implement [`Ord`] themselves.  The comparator is shared
/// behind an [`Arc`] so that clones and flipped trees can reuse it, and it
/// is `Send + Sync` so guarded trees can be shared between threads.
pub type Comparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

/// Wraps a closure as a [`Comparator`].
///
/// # Examples
/// ```
/// use ordered_trees::comparator;
/// use std::cmp::Ordering;
///
/// let by_len = comparator::from_fn(|a: &String, b: &String| a.len().cmp(&b.len()));
/// assert_eq!(by_len(&"ab".to_string(), &"c".to_string()), Ordering::Greater);
/// ```
pub fn from_fn<K, F>(f: F) -> Comparator<K>
where
    F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The natural ordering of an [`Ord`] key.
pub fn natural<K: Ord + 'static>() -> Comparator<K> {
    Arc::new(|a: &K, b: &K| a.cmp(b))
}

/// The reverse of the natural ordering.
pub fn reverse<K: Ord + 'static>() -> Comparator<K> {
    Arc::new(|a: &K, b: &K| b.cmp(a))
}

/// Orders keys by a projection.
///
/// # Examples
/// ```
/// use ordered_trees::{comparator, AvlTree};
///
/// let t = AvlTree::new(comparator::by_key(|s: &&str| s.len()));
/// t.set("ccc", 3);
/// t.set("a", 1);
/// assert_eq!(t.keys(), vec!["a", "ccc"]);
/// ```
pub fn by_key<K, T, F>(f: F) -> Comparator<K>
where
    K: 'static,
    T: Ord + 'static,
    F: Fn(&K) -> T + Send + Sync + 'static,
{
    Arc::new(move |a: &K, b: &K| f(a).cmp(&f(b)))
}

/// Orders keys by their string rendering, as a JSON object would.
pub fn by_string<K: ToString + 'static>() -> Comparator<K> {
    Arc::new(|a: &K, b: &K| a.to_string().cmp(&b.to_string()))
}
