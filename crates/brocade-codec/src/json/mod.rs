//! JSON (RFC 8259) reader and writer.
//!
//! The reader is a pull parser over bytes: it sniffs UTF-8/16/32 per
//! RFC 4627 (BOM first, then the null-byte pattern of the first four
//! bytes), tracks line and column for errors, and resumes from an
//! exhausted buffer in partial mode. Opt-in extensions cover comments,
//! unquoted keys, trailing commas and CBOR diagnostic notation
//! (`h'…'` byte strings, `simple(n)`, non-finite floats).

mod reader;
mod writer;

pub use reader::JsonReader;
pub use writer::JsonWriter;

use brocade_node::Node;

use crate::error::Result;

/// Reader configuration
#[derive(Debug, Clone, bon::Builder)]
pub struct JsonReadOptions {
    /// Input may end mid-document and be resumed with `push_input`
    #[builder(default = false)]
    pub partial: bool,
    /// Accept `//` and `/* */` comments
    #[builder(default = false)]
    pub allow_comments: bool,
    /// Accept bareword object keys
    #[builder(default = false)]
    pub allow_unquoted_key: bool,
    /// Accept a comma before `}` or `]`
    #[builder(default = false)]
    pub allow_trailing_comma: bool,
    /// Accept CBOR diagnostic extensions: `h'…'`, `simple(n)`,
    /// `undefined`, `NaN`, `Infinity`, `-Infinity`
    #[builder(default = false)]
    pub cbor_diag: bool,
    /// Maximum decoded length of one string
    #[builder(default = 64 * 1024 * 1024)]
    pub max_string_length: usize,
    /// Maximum container nesting
    #[builder(default = 64)]
    pub max_recursion: usize,
    /// Cap on total input bytes accepted
    pub byte_budget: Option<usize>,
}

impl Default for JsonReadOptions {
    fn default() -> Self {
        JsonReadOptions::builder().build()
    }
}

/// Writer configuration
#[derive(Debug, Clone, bon::Builder)]
pub struct JsonWriteOptions {
    /// Indent output; two spaces unless `indent` overrides
    #[builder(default = false)]
    pub pretty: bool,
    /// Indent unit for pretty output
    #[builder(default = String::from("  "), into)]
    pub indent: String,
    /// Sort map keys by Unicode code point
    #[builder(default = false)]
    pub sorted: bool,
    /// Render NaN and the infinities as `null` instead of failing
    #[builder(default = false)]
    pub allow_nan: bool,
    /// Emit CBOR diagnostic notation for buffers, tags, undefined and
    /// non-finite floats
    #[builder(default = false)]
    pub cbor_diag: bool,
    /// Maximum length of one emitted string
    #[builder(default = 64 * 1024 * 1024)]
    pub max_string_length: usize,
    /// Maximum container nesting
    #[builder(default = 64)]
    pub max_recursion: usize,
}

impl Default for JsonWriteOptions {
    fn default() -> Self {
        JsonWriteOptions::builder().build()
    }
}

/// Parse a complete JSON document from text
pub fn from_str(text: &str) -> Result<Node> {
    from_bytes(text.as_bytes())
}

/// Parse a complete JSON document from bytes, sniffing the encoding
pub fn from_bytes(bytes: &[u8]) -> Result<Node> {
    let mut reader = JsonReader::new(bytes, JsonReadOptions::default());
    let node = reader.read_value()?;
    reader.expect_end()?;
    Ok(node)
}

/// Serialize with default options (compact, strict)
pub fn to_string(node: &Node) -> Result<String> {
    let mut writer = JsonWriter::new(JsonWriteOptions::default());
    writer.write_node(node)?;
    Ok(writer.into_string())
}
