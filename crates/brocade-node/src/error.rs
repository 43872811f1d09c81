//! Error types for value-tree operations

/// Result type alias for tree operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors surfaced by the value tree itself.
///
/// Codec failures live in `brocade-codec`; the tree only reports path,
/// coercion and structural-invariant violations. Operations that fail
/// leave the tree untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum NodeError {
    /// Path text did not match the path grammar
    #[error("invalid path `{path}` at byte {offset}: {reason}")]
    BadPath {
        /// The offending path text
        path: String,
        /// Byte offset of the first unparseable character
        offset: usize,
        /// What the parser expected
        reason: &'static str,
    },

    /// An accessor could not represent the value in the requested type
    #[error("cannot coerce {from} to {to}")]
    BadCoercion {
        /// Variant tag of the node
        from: &'static str,
        /// Requested representation
        to: &'static str,
    },

    /// Inserting the node would share it between parents or close a cycle
    #[error("node already has a parent or is an ancestor of the insertion point")]
    CycleOrShared,

    /// An event sequence handed to the builder was not well formed
    #[error("malformed event stream: {0}")]
    BadEventStream(&'static str),
}
