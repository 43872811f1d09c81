//! MsgPack (msgpack-spec 2017) reader and writer.
//!
//! `nil` maps to null, `bin` to buffer, `str` to string, and ext
//! values to a buffer node tagged with the unsigned byte value of the
//! ext code — timestamps (ext −1, surfacing as tag 255) are handed to
//! the caller undecoded. Non-string map keys coerce to text the same
//! way the CBOR reader coerces them.

mod reader;
mod writer;

pub use reader::MsgPackReader;
pub use writer::MsgPackWriter;

use brocade_node::Node;

use crate::error::Result;

/// Reader configuration
#[derive(Debug, Clone, bon::Builder)]
pub struct MsgPackReadOptions {
    /// Input may be fed incrementally with `push_input`
    #[builder(default = false)]
    pub partial: bool,
    /// Maximum container nesting
    #[builder(default = 64)]
    pub max_recursion: usize,
    /// Maximum decoded size of one string, binary or ext payload
    #[builder(default = 64 * 1024 * 1024)]
    pub max_string_length: usize,
    /// Cap on total input bytes accepted
    pub byte_budget: Option<usize>,
}

impl Default for MsgPackReadOptions {
    fn default() -> Self {
        MsgPackReadOptions::builder().build()
    }
}

/// Writer configuration
#[derive(Debug, Clone, bon::Builder)]
pub struct MsgPackWriteOptions {
    /// Sort map keys by Unicode code point before writing
    #[builder(default = false)]
    pub sorted: bool,
    /// Maximum container nesting
    #[builder(default = 64)]
    pub max_recursion: usize,
}

impl Default for MsgPackWriteOptions {
    fn default() -> Self {
        MsgPackWriteOptions::builder().build()
    }
}

/// Decode a complete MsgPack document. Trailing bytes are an error.
pub fn from_slice(bytes: &[u8]) -> Result<Node> {
    let mut reader = MsgPackReader::new(bytes, MsgPackReadOptions::default());
    let node = reader.read_value()?;
    reader.expect_end()?;
    Ok(node)
}

/// Encode a tree with default options
pub fn to_vec(node: &Node) -> Result<Vec<u8>> {
    let mut writer = MsgPackWriter::new(MsgPackWriteOptions::default());
    writer.write_node(node)?;
    Ok(writer.into_bytes())
}
