//! CBOR (RFC 7049 / RFC 8949) reader and writer.
//!
//! The reader accepts every major type including indefinite-length
//! strings, lists and maps, half/single/double floats, the full simple
//! range and tags. Tags 2 and 3 promote their byte-string content to a
//! big integer; every other tag passes through onto the node. Map keys
//! that are not text are coerced to their canonical text form (a
//! rejection hook is available on the options). The writer emits
//! preferred (shortest) encodings; indefinite-length framing appears
//! only when writing raw event streams.

mod reader;
mod writer;

pub use reader::CborReader;
pub use writer::CborWriter;

use brocade_node::{Node, Scalar};

use crate::error::Result;

/// Reader configuration
#[derive(Debug, Clone, bon::Builder)]
pub struct CborReadOptions {
    /// Input may be fed incrementally with `push_input`
    #[builder(default = false)]
    pub partial: bool,
    /// Maximum container nesting
    #[builder(default = 64)]
    pub max_recursion: usize,
    /// Maximum decoded size of one text or byte string
    #[builder(default = 64 * 1024 * 1024)]
    pub max_string_length: usize,
    /// Cap on total input bytes accepted
    pub byte_budget: Option<usize>,
    /// Called for each non-text map key before coercion; return
    /// `false` to reject the document instead
    pub on_nonstring_key: Option<fn(&Scalar) -> bool>,
}

impl Default for CborReadOptions {
    fn default() -> Self {
        CborReadOptions::builder().build()
    }
}

/// Writer configuration
#[derive(Debug, Clone, bon::Builder)]
pub struct CborWriteOptions {
    /// Sort map keys by Unicode code point before writing
    #[builder(default = false)]
    pub sorted: bool,
    /// Write map keys that are canonical decimal integers as CBOR
    /// integer keys. This is the inverse of the reader's key
    /// coercion and is how COSE structures with integer labels
    /// round-trip through the string-keyed tree.
    #[builder(default = false)]
    pub int_keys: bool,
    /// Maximum container nesting
    #[builder(default = 64)]
    pub max_recursion: usize,
}

impl Default for CborWriteOptions {
    fn default() -> Self {
        CborWriteOptions::builder().build()
    }
}

/// Decode a complete CBOR document. Trailing bytes are an error.
pub fn from_slice(bytes: &[u8]) -> Result<Node> {
    let mut reader = CborReader::new(bytes, CborReadOptions::default());
    let node = reader.read_value()?;
    reader.expect_end()?;
    Ok(node)
}

/// Encode a tree with default (preferred-form) options
pub fn to_vec(node: &Node) -> Result<Vec<u8>> {
    let mut writer = CborWriter::new(CborWriteOptions::default());
    writer.write_node(node)?;
    Ok(writer.into_bytes())
}
