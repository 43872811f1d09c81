//! Box tree reader.

use bytes::Bytes;

use brocade_codec::cbor::{CborReadOptions, CborReader};
use brocade_codec::json::{JsonReadOptions, JsonReader};

use crate::error::{BoxError, Result};
use crate::fourcc::{self, FourCC};
use crate::{BoxNode, Payload};

/// Parse a sequence of sibling boxes spanning `bytes` exactly
pub fn read_boxes(bytes: &[u8]) -> Result<Vec<BoxNode>> {
    read_siblings(bytes, 0)
}

fn read_siblings(bytes: &[u8], base_offset: usize) -> Result<Vec<BoxNode>> {
    let mut boxes = Vec::new();
    let mut at = 0usize;
    while at < bytes.len() {
        let (node, consumed) = read_box(&bytes[at..], base_offset + at)?;
        boxes.push(node);
        at += consumed;
    }
    Ok(boxes)
}

/// One box starting at the head of `bytes`. Returns the node and the
/// bytes consumed.
fn read_box(bytes: &[u8], offset: usize) -> Result<(BoxNode, usize)> {
    if bytes.len() < 8 {
        return Err(BoxError::Truncated { offset });
    }
    let len32 = u32::from_be_bytes(bytes[..4].try_into().expect("checked")) as u64;
    let kind = FourCC::new(bytes[4..8].try_into().expect("checked"));
    let (total, header) = match len32 {
        // to end of stream
        0 => (bytes.len() as u64, 8usize),
        // 64-bit extended length follows the type
        1 => {
            if bytes.len() < 16 {
                return Err(BoxError::Truncated { offset });
            }
            let ext = u64::from_be_bytes(bytes[8..16].try_into().expect("checked"));
            (ext, 16usize)
        }
        n => (n, 8usize),
    };
    if total < header as u64 {
        return Err(BoxError::malformed("box length shorter than header", offset));
    }
    let total = usize::try_from(total)
        .map_err(|_| BoxError::malformed("box length exceeds address space", offset))?;
    if total > bytes.len() {
        return Err(BoxError::Truncated { offset });
    }
    let payload = &bytes[header..total];
    let node = parse_payload(kind, payload, offset + header)?;
    Ok((node, total))
}

fn parse_payload(kind: FourCC, payload: &[u8], offset: usize) -> Result<BoxNode> {
    if kind.is_container() {
        // children fill the extent; a tail too short to frame another
        // box is padding
        let mut children = Vec::new();
        let mut at = 0usize;
        let mut padding = Bytes::new();
        while at < payload.len() {
            if payload.len() - at < 8 {
                padding = Bytes::copy_from_slice(&payload[at..]);
                break;
            }
            let (child, consumed) = read_box(&payload[at..], offset + at)?;
            children.push(child);
            at += consumed;
        }
        return Ok(BoxNode {
            kind,
            payload: Payload::Children(children),
            padding,
        });
    }
    if kind == fourcc::CBOR {
        let mut reader = CborReader::new(payload, CborReadOptions::default());
        let node = reader.read_value()?;
        let padding = Bytes::copy_from_slice(&payload[reader.consumed()..]);
        return Ok(BoxNode {
            kind,
            payload: Payload::Cbor(node),
            padding,
        });
    }
    if kind == fourcc::JSON {
        let mut reader = JsonReader::new(payload, JsonReadOptions::default());
        let node = reader.read_value()?;
        let padding = Bytes::copy_from_slice(&payload[reader.consumed()..]);
        return Ok(BoxNode {
            kind,
            payload: Payload::Json(node),
            padding,
        });
    }
    if kind == fourcc::JUMD || kind == fourcc::BFDB || kind == fourcc::BIDB {
        return Ok(BoxNode {
            kind,
            payload: Payload::Data(Bytes::copy_from_slice(payload)),
            padding: Bytes::new(),
        });
    }
    Ok(BoxNode {
        kind,
        payload: Payload::Raw(Bytes::copy_from_slice(payload)),
        padding: Bytes::new(),
    })
}
