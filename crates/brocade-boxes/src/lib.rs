//! ISO base-media / JUMBF box trees.
//!
//! A box is `length(4) | type(4) | [extended length(8)] | payload`.
//! Container types from the fixed registry recurse into child boxes;
//! `cbor` and `json` boxes parse their payload through the codecs;
//! everything else keeps its bytes. Trailing bytes inside a box that
//! are not part of the parsed content are retained verbatim so hashes
//! over re-encoded trees reproduce.

pub mod error;
pub mod fourcc;
pub mod jpeg;
pub mod jumbf;
mod read;
mod write;

pub use error::{BoxError, Result};
pub use fourcc::FourCC;
pub use read::read_boxes;

use brocade_node::Node;
use bytes::Bytes;

/// Payload of one box
#[derive(Debug)]
pub enum Payload {
    /// Child boxes of a container type
    Children(Vec<BoxNode>),
    /// Value tree of a `cbor` content box
    Cbor(Node),
    /// Value tree of a `json` content box
    Json(Node),
    /// Buffered bytes of a recognised data box (`jumd`, `bfdb`,
    /// `bidb`)
    Data(Bytes),
    /// Raw byte range of an unrecognised leaf
    Raw(Bytes),
}

/// One node of a box tree
#[derive(Debug)]
pub struct BoxNode {
    /// Four-character type code
    pub kind: FourCC,
    /// Parsed or raw payload
    pub payload: Payload,
    /// Verbatim trailing bytes inside the box extent
    pub padding: Bytes,
}

impl BoxNode {
    /// Container box with children
    pub fn container(kind: FourCC, children: Vec<BoxNode>) -> BoxNode {
        BoxNode {
            kind,
            payload: Payload::Children(children),
            padding: Bytes::new(),
        }
    }

    /// Leaf box over raw bytes
    pub fn raw(kind: FourCC, bytes: impl Into<Bytes>) -> BoxNode {
        BoxNode {
            kind,
            payload: Payload::Raw(bytes.into()),
            padding: Bytes::new(),
        }
    }

    /// Child boxes, if this is a container
    pub fn children(&self) -> &[BoxNode] {
        match &self.payload {
            Payload::Children(c) => c,
            _ => &[],
        }
    }

    /// Mutable child boxes, if this is a container
    pub fn children_mut(&mut self) -> Option<&mut Vec<BoxNode>> {
        match &mut self.payload {
            Payload::Children(c) => Some(c),
            _ => None,
        }
    }

    /// Subtype discriminator: the 16-byte UUID heading a `uuid` box
    /// payload, or the content-type UUID of a `jumb` superbox's
    /// description box
    pub fn uuid_subtype(&self) -> Option<[u8; 16]> {
        if self.kind == fourcc::UUID {
            let bytes = match &self.payload {
                Payload::Data(b) | Payload::Raw(b) => b,
                _ => return None,
            };
            return bytes.get(..16).and_then(|s| s.try_into().ok());
        }
        jumbf::subtype(self)
    }

    /// Encoded form of this box
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write::write_box(self, &mut out)?;
        Ok(out)
    }

    /// Encoded payload of this box: children, content and padding,
    /// without the box header. This is the byte range C2PA hashed
    /// URIs digest.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write::write_payload(self, &mut out)?;
        out.extend_from_slice(&self.padding);
        Ok(out)
    }
}
