//! Error types for box-tree operations

/// Result type alias for box operations
pub type Result<T> = std::result::Result<T, BoxError>;

/// Errors surfaced while reading or writing box trees
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum BoxError {
    /// Box framing violated the layout rules
    #[error("malformed box structure at byte {offset}: {message}")]
    Malformed {
        /// What was wrong
        message: &'static str,
        /// Byte offset of the failure
        offset: usize,
    },

    /// Input stopped inside a box extent
    #[error("input ended inside a box at byte {offset}")]
    Truncated {
        /// Byte offset where input ran out
        offset: usize,
    },

    /// Embedded JSON or CBOR content failed to parse
    #[error(transparent)]
    Content(#[from] brocade_codec::CodecError),

    /// JPEG segment stream violated the embedding convention
    #[error("malformed JPEG: {0}")]
    Jpeg(&'static str),
}

impl BoxError {
    pub(crate) fn malformed(message: &'static str, offset: usize) -> BoxError {
        BoxError::Malformed { message, offset }
    }
}
