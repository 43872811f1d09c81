//! Assertions: typed statements carried as JUMBF superboxes.
//!
//! The superbox label discriminates the kind; the content box is CBOR
//! for most kinds and JSON-LD for schema.org statements. Unknown
//! labels stay usable as generic CBOR/JSON assertions.

use bytes::Bytes;

use brocade_boxes::{BoxNode, Payload, fourcc, jumbf};
use brocade_node::Node;

use crate::error::Result;

/// Hard-binding label for raw byte-range hashing
pub const LABEL_DATA_HASH: &str = "c2pa.hash.data";
/// Hard-binding label for box-aware BMFF hashing
pub const LABEL_BMFF_HASH: &str = "c2pa.hash.bmff";
/// Second flavour of the BMFF hard binding
pub const LABEL_BMFF_HASH_V2: &str = "c2pa.hash.bmff.v2";
/// Provenance actions list
pub const LABEL_ACTIONS: &str = "c2pa.actions";
/// Ingredient reference
pub const LABEL_INGREDIENT: &str = "c2pa.ingredient";
/// Schema.org creative-work statement
pub const LABEL_CREATIVE_WORK: &str = "stds.schema-org.CreativeWork";

/// Discriminated assertion families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionKind {
    /// `c2pa.hash.data`
    DataHash,
    /// `c2pa.hash.bmff`
    BmffHash,
    /// `c2pa.hash.bmff.v2`
    BmffHashV2,
    /// `c2pa.actions`
    Actions,
    /// `c2pa.ingredient`
    Ingredient,
    /// `stds.schema-org.CreativeWork`
    CreativeWork,
    /// Any other CBOR assertion
    Cbor,
    /// Any other JSON assertion
    Json,
}

/// Assertion payload in its parsed form
#[derive(Debug)]
pub enum AssertionContent {
    /// CBOR content box
    Cbor(Node),
    /// JSON content box
    Json(Node),
    /// Opaque data box
    Data(Bytes),
}

/// One assertion of a manifest
#[derive(Debug)]
pub struct Assertion {
    /// Label, unique within the assertion store
    pub label: String,
    /// Parsed content
    pub content: AssertionContent,
}

impl Assertion {
    /// CBOR assertion
    pub fn cbor(label: impl Into<String>, content: Node) -> Assertion {
        Assertion {
            label: label.into(),
            content: AssertionContent::Cbor(content),
        }
    }

    /// JSON assertion
    pub fn json(label: impl Into<String>, content: Node) -> Assertion {
        Assertion {
            label: label.into(),
            content: AssertionContent::Json(content),
        }
    }

    /// Kind, discriminated by label with a content fallback. A
    /// `__n` suffix (the convention for repeated labels) is ignored.
    pub fn kind(&self) -> AssertionKind {
        let base = self
            .label
            .split_once("__")
            .map_or(self.label.as_str(), |(base, _)| base);
        match base {
            LABEL_DATA_HASH => AssertionKind::DataHash,
            LABEL_BMFF_HASH => AssertionKind::BmffHash,
            LABEL_BMFF_HASH_V2 => AssertionKind::BmffHashV2,
            LABEL_ACTIONS => AssertionKind::Actions,
            LABEL_INGREDIENT => AssertionKind::Ingredient,
            LABEL_CREATIVE_WORK => AssertionKind::CreativeWork,
            _ => match &self.content {
                AssertionContent::Json(_) => AssertionKind::Json,
                _ => AssertionKind::Cbor,
            },
        }
    }

    /// True for the labels that bind the asset bytes
    pub fn is_hard_binding(&self) -> bool {
        matches!(
            self.kind(),
            AssertionKind::DataHash | AssertionKind::BmffHash | AssertionKind::BmffHashV2
        )
    }

    /// Content as a value tree, when it has one
    pub fn value(&self) -> Option<Node> {
        match &self.content {
            AssertionContent::Cbor(n) | AssertionContent::Json(n) => Some(n.clone()),
            AssertionContent::Data(_) => None,
        }
    }

    /// The assertion as a labelled superbox
    pub fn to_box(&self) -> BoxNode {
        let (content_kind, payload) = match &self.content {
            AssertionContent::Cbor(n) => (fourcc::CBOR, Payload::Cbor(n.duplicate())),
            AssertionContent::Json(n) => (fourcc::JSON, Payload::Json(n.duplicate())),
            AssertionContent::Data(b) => (fourcc::BFDB, Payload::Data(b.clone())),
        };
        let content_box = BoxNode {
            kind: content_kind,
            payload,
            padding: Bytes::new(),
        };
        jumbf::superbox(
            jumbf::DescriptionBox::labelled(jumbf::type_uuid(&content_kind.0), &self.label),
            vec![content_box],
        )
    }

    /// Read an assertion back from its superbox
    pub fn from_box(node: &BoxNode) -> Option<Assertion> {
        let label = jumbf::label(node)?;
        let content_box = node.children().get(1)?;
        let content = match &content_box.payload {
            Payload::Cbor(n) => AssertionContent::Cbor(n.duplicate()),
            Payload::Json(n) => AssertionContent::Json(n.duplicate()),
            Payload::Data(b) | Payload::Raw(b) => AssertionContent::Data(b.clone()),
            Payload::Children(_) => return None,
        };
        Some(Assertion { label, content })
    }

    /// The bytes hashed-URI digests cover: the superbox payload
    /// (children only, not the superbox header)
    pub fn digest_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_box().payload_bytes()?)
    }
}
