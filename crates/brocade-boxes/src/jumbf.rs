//! JUMBF superboxes and description boxes (ISO/IEC 19566-5).
//!
//! A superbox is a `jumb` container whose first child must be a
//! `jumd` description box naming the content type (a 16-byte UUID)
//! and, usually, a requestable label. Specialized superbox families
//! (such as the C2PA store) are discriminated by that UUID.

use bytes::Bytes;

use crate::error::{BoxError, Result};
use crate::fourcc::{self, FourCC};
use crate::{BoxNode, Payload};

/// Toggle bits of a description box
const TOGGLE_REQUESTABLE: u8 = 0x01;
const TOGGLE_LABEL: u8 = 0x02;
const TOGGLE_ID: u8 = 0x04;
const TOGGLE_HASH: u8 = 0x08;

/// The ISO UUID suffix shared by JUMBF content types built from a
/// four-character code: `XXXXXXXX-0011-0010-8000-00AA00389B71`
const UUID_SUFFIX: [u8; 12] = [
    0x00, 0x11, 0x00, 0x10, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

/// Content-type UUID for a four-character code
pub fn type_uuid(code: &[u8; 4]) -> [u8; 16] {
    let mut uuid = [0u8; 16];
    uuid[..4].copy_from_slice(code);
    uuid[4..].copy_from_slice(&UUID_SUFFIX);
    uuid
}

/// Parsed `jumd` description box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionBox {
    /// Content-type UUID of the superbox
    pub uuid: [u8; 16],
    /// Box is requestable by label
    pub requestable: bool,
    /// Application label
    pub label: Option<String>,
    /// Application-assigned numeric id
    pub id: Option<u32>,
    /// SHA-256 of the superbox payload, when signed
    pub hash: Option<[u8; 32]>,
}

impl DescriptionBox {
    /// Description with a requestable label
    pub fn labelled(uuid: [u8; 16], label: impl Into<String>) -> DescriptionBox {
        DescriptionBox {
            uuid,
            requestable: true,
            label: Some(label.into()),
            id: None,
            hash: None,
        }
    }

    /// Parse the payload of a `jumd` box
    pub fn parse(data: &[u8]) -> Result<DescriptionBox> {
        if data.len() < 17 {
            return Err(BoxError::malformed("description box too short", 0));
        }
        let uuid: [u8; 16] = data[..16].try_into().expect("checked");
        let toggles = data[16];
        let mut at = 17usize;
        let label = if toggles & TOGGLE_LABEL != 0 {
            let end = data[at..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| BoxError::malformed("unterminated label", at))?;
            let text = std::str::from_utf8(&data[at..at + end])
                .map_err(|_| BoxError::malformed("label is not UTF-8", at))?
                .to_string();
            at += end + 1;
            Some(text)
        } else {
            None
        };
        let id = if toggles & TOGGLE_ID != 0 {
            let raw: [u8; 4] = data
                .get(at..at + 4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| BoxError::malformed("truncated id", at))?;
            at += 4;
            Some(u32::from_be_bytes(raw))
        } else {
            None
        };
        let hash = if toggles & TOGGLE_HASH != 0 {
            let raw: [u8; 32] = data
                .get(at..at + 32)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| BoxError::malformed("truncated hash", at))?;
            Some(raw)
        } else {
            None
        };
        Ok(DescriptionBox {
            uuid,
            requestable: toggles & TOGGLE_REQUESTABLE != 0,
            label,
            id,
            hash,
        })
    }

    /// Encoded payload of the `jumd` box
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut toggles = 0u8;
        if self.requestable {
            toggles |= TOGGLE_REQUESTABLE;
        }
        if self.label.is_some() {
            toggles |= TOGGLE_LABEL;
        }
        if self.id.is_some() {
            toggles |= TOGGLE_ID;
        }
        if self.hash.is_some() {
            toggles |= TOGGLE_HASH;
        }
        let mut out = Vec::with_capacity(17);
        out.extend_from_slice(&self.uuid);
        out.push(toggles);
        if let Some(label) = &self.label {
            out.extend_from_slice(label.as_bytes());
            out.push(0);
        }
        if let Some(id) = self.id {
            out.extend_from_slice(&id.to_be_bytes());
        }
        if let Some(hash) = &self.hash {
            out.extend_from_slice(hash);
        }
        out
    }

    /// As a `jumd` box node
    pub fn to_box(&self) -> BoxNode {
        BoxNode {
            kind: fourcc::JUMD,
            payload: Payload::Data(Bytes::from(self.to_bytes())),
            padding: Bytes::new(),
        }
    }
}

/// Build a superbox: `jumb` with the description first, then content
pub fn superbox(desc: DescriptionBox, mut content: Vec<BoxNode>) -> BoxNode {
    let mut children = Vec::with_capacity(content.len() + 1);
    children.push(desc.to_box());
    children.append(&mut content);
    BoxNode::container(fourcc::JUMB, children)
}

/// Description of a superbox, read from its first child
pub fn description(node: &BoxNode) -> Option<DescriptionBox> {
    if node.kind != fourcc::JUMB {
        return None;
    }
    let first = node.children().first()?;
    if first.kind != fourcc::JUMD {
        return None;
    }
    match &first.payload {
        Payload::Data(data) => DescriptionBox::parse(data).ok(),
        _ => None,
    }
}

/// Content-type UUID of a superbox (its subtype discriminator)
pub fn subtype(node: &BoxNode) -> Option<[u8; 16]> {
    description(node).map(|d| d.uuid)
}

/// Label of a superbox
pub fn label(node: &BoxNode) -> Option<String> {
    description(node)?.label
}

/// Direct child superbox with the given label
pub fn child_by_label<'a>(node: &'a BoxNode, want: &str) -> Option<&'a BoxNode> {
    node.children()
        .iter()
        .find(|child| label(child).as_deref() == Some(want))
}

/// Resolve a slash-separated label path below a superbox
pub fn find_by_path<'a>(node: &'a BoxNode, path: &str) -> Option<&'a BoxNode> {
    let mut cur = node;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        cur = child_by_label(cur, part)?;
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_round_trip() {
        let desc = DescriptionBox {
            uuid: type_uuid(b"c2pa"),
            requestable: true,
            label: Some("c2pa".to_string()),
            id: Some(7),
            hash: Some([0xab; 32]),
        };
        let parsed = DescriptionBox::parse(&desc.to_bytes()).expect("parse");
        assert_eq!(parsed, desc);
    }

    #[test]
    fn minimal_description() {
        let desc = DescriptionBox {
            uuid: [0u8; 16],
            requestable: false,
            label: None,
            id: None,
            hash: None,
        };
        let bytes = desc.to_bytes();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[16], 0);
        assert_eq!(DescriptionBox::parse(&bytes).unwrap(), desc);
    }

    #[test]
    fn superbox_layout_matches_reference_bytes() {
        // jumb { jumd(uuid=0, toggles=0) , abcd("some data") }
        let desc = DescriptionBox {
            uuid: [0u8; 16],
            requestable: false,
            label: None,
            id: None,
            hash: None,
        };
        let sbox = superbox(
            desc,
            vec![BoxNode::raw(FourCC::new(b"abcd"), &b"some data"[..])],
        );
        let bytes = sbox.to_bytes().expect("write");
        let expected = {
            let mut v = Vec::new();
            v.extend_from_slice(&50u32.to_be_bytes());
            v.extend_from_slice(b"jumb");
            v.extend_from_slice(&25u32.to_be_bytes());
            v.extend_from_slice(b"jumd");
            v.extend_from_slice(&[0u8; 16]);
            v.push(0);
            v.extend_from_slice(&17u32.to_be_bytes());
            v.extend_from_slice(b"abcd");
            v.extend_from_slice(b"some data");
            v
        };
        assert_eq!(bytes, expected);
    }

    #[test]
    fn label_navigation() {
        let leaf = superbox(
            DescriptionBox::labelled(type_uuid(b"c2cl"), "c2pa.claim"),
            vec![],
        );
        let store = superbox(
            DescriptionBox::labelled(type_uuid(b"c2pa"), "c2pa"),
            vec![superbox(
                DescriptionBox::labelled(type_uuid(b"c2ma"), "urn:uuid:1234"),
                vec![leaf],
            )],
        );
        assert_eq!(label(&store).as_deref(), Some("c2pa"));
        let claim = find_by_path(&store, "urn:uuid:1234/c2pa.claim").expect("resolve");
        assert_eq!(label(claim).as_deref(), Some("c2pa.claim"));
        assert!(find_by_path(&store, "urn:uuid:1234/missing").is_none());
        assert_eq!(
            subtype(&store).unwrap()[..4],
            *b"c2pa"
        );
    }
}
