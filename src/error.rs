/// Errors reported by tree operations.
///
/// Lookups that find nothing are not errors; they return `None`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The JSON document was malformed, or one of its keys or values did not
    /// convert to the tree's key or value type.
    #[error("tree json: {0}")]
    Json(#[from] serde_json::Error),

    /// A B-tree was configured with fewer than three children per node.
    #[error("b-tree order must be at least 3, got {order}")]
    InvalidOrder { order: usize },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
