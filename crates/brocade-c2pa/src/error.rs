//! Error types for the manifest engine.
//!
//! Verification never returns these for content failures: every
//! check folds into the status list. Errors are reserved for callers
//! handing over something that is not a traversable store, and for
//! signing preconditions, which refuse to produce output.

use crate::status::ValidationStatus;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, C2paError>;

/// Errors surfaced while building, signing or loading a store
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum C2paError {
    /// A signing precondition failed; the status names the check
    #[error("signing precondition failed: {0}")]
    Precondition(ValidationStatus),

    /// The container shape is not a C2PA store
    #[error("not a C2PA store: {0}")]
    Structure(&'static str),

    /// Box-level failure
    #[error(transparent)]
    Boxes(#[from] brocade_boxes::BoxError),

    /// Codec failure inside a content box
    #[error(transparent)]
    Codec(#[from] brocade_codec::CodecError),

    /// Signing layer failure
    #[error(transparent)]
    Jose(#[from] brocade_jose::JoseError),

    /// Value-tree failure
    #[error(transparent)]
    Node(#[from] brocade_node::NodeError),
}
