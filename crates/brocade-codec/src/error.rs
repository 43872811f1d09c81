//! Error types for codec operations

use brocade_node::NodeError;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Position inside the input, as far as the format can name one.
/// The text codec tracks line and column; the binary codecs report the
/// byte offset only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Byte offset from the start of the input
    pub offset: usize,
    /// 1-based line, or 0 for binary input
    pub line: u32,
    /// 1-based column in characters, or 0 for binary input
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "line {}, column {}", self.line, self.column)
        } else {
            write!(f, "byte {}", self.offset)
        }
    }
}

/// Errors surfaced by the codec readers and writers
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CodecError {
    /// Input violated the format grammar
    #[error("syntax error at {location}: {message}")]
    Syntax {
        /// What went wrong
        message: String,
        /// Where it went wrong
        location: Location,
    },

    /// Input ended inside a document and the reader is not partial
    #[error("unexpected end of input at {location}")]
    UnexpectedEnd {
        /// Where the input ran out
        location: Location,
    },

    /// A CBOR map carried the same key twice
    #[error("duplicate map key `{key}` at {location}")]
    DuplicateKey {
        /// The repeated key
        key: String,
        /// Position of the second occurrence
        location: Location,
    },

    /// NaN or an infinity reached a writer that cannot express it
    #[error("non-finite number cannot be written")]
    NumericNonFinite,

    /// A caller-supplied size or depth limit was exceeded
    #[error("{limit} limit exceeded")]
    ResourceLimit {
        /// Which limit tripped
        limit: &'static str,
    },

    /// A value has no representation in the output format
    #[error("cannot encode {what}")]
    Unsupported {
        /// What could not be encoded
        what: &'static str,
    },

    /// Value-tree failure while building the result
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl CodecError {
    pub(crate) fn syntax(message: impl Into<String>, location: Location) -> CodecError {
        CodecError::Syntax {
            message: message.into(),
            location,
        }
    }

    /// True when the failure is an input underrun that more bytes
    /// could cure
    pub fn is_underrun(&self) -> bool {
        matches!(self, CodecError::UnexpectedEnd { .. })
    }
}
