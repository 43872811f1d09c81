//! Box tree writer.

use brocade_codec::cbor::{CborWriteOptions, CborWriter};
use brocade_codec::json::{JsonWriteOptions, JsonWriter};

use crate::error::Result;
use crate::{BoxNode, Payload};

/// Encode one box: four-byte length placeholder, type, payload, then
/// the length patched over the placeholder. The extended 64-bit form
/// is only produced when the total cannot fit 32 bits.
pub(crate) fn write_box(node: &BoxNode, out: &mut Vec<u8>) -> Result<()> {
    let start = out.len();
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&node.kind.0);
    write_payload(node, out)?;
    out.extend_from_slice(&node.padding);
    let total = out.len() - start;
    match u32::try_from(total) {
        Ok(len) => out[start..start + 4].copy_from_slice(&len.to_be_bytes()),
        Err(_) => {
            // extended length: size marker 1, 64-bit length after the
            // type, which grows the box by eight bytes
            out[start..start + 4].copy_from_slice(&1u32.to_be_bytes());
            let extended = (total as u64 + 8).to_be_bytes();
            let at = start + 8;
            out.splice(at..at, extended);
        }
    }
    Ok(())
}

/// Payload only, without header or trailing padding
pub(crate) fn write_payload(node: &BoxNode, out: &mut Vec<u8>) -> Result<()> {
    match &node.payload {
        Payload::Children(children) => {
            for child in children {
                write_box(child, out)?;
            }
        }
        Payload::Cbor(value) => {
            let mut writer = CborWriter::new(CborWriteOptions::default());
            writer.write_node(value)?;
            out.extend_from_slice(&writer.into_bytes());
        }
        Payload::Json(value) => {
            let mut writer = JsonWriter::new(JsonWriteOptions::default());
            writer.write_node(value)?;
            out.extend_from_slice(writer.into_string().as_bytes());
        }
        Payload::Data(bytes) | Payload::Raw(bytes) => out.extend_from_slice(bytes),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::FourCC;
    use crate::read::read_boxes;
    use bytes::Bytes;

    #[test]
    fn writer_reproduces_reader_input() {
        let inner = {
            let mut v = Vec::new();
            v.extend_from_slice(&17u32.to_be_bytes());
            v.extend_from_slice(b"abcd");
            v.extend_from_slice(b"some data");
            v
        };
        let mut outer = Vec::new();
        outer.extend_from_slice(&(8 + inner.len() as u32).to_be_bytes());
        outer.extend_from_slice(b"moov");
        outer.extend_from_slice(&inner);

        let boxes = read_boxes(&outer).expect("parse");
        assert_eq!(boxes[0].to_bytes().expect("write"), outer);
    }

    #[test]
    fn padding_written_verbatim() {
        let node = BoxNode {
            kind: FourCC::new(b"test"),
            payload: Payload::Raw(Bytes::from_static(b"xy")),
            padding: Bytes::from_static(&[0, 0, 0]),
        };
        let bytes = node.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8 + 2 + 3);
        assert_eq!(&bytes[..4], &13u32.to_be_bytes());
        assert_eq!(&bytes[10..], &[0, 0, 0]);
        let back = read_boxes(&bytes).unwrap();
        match &back[0].payload {
            Payload::Raw(b) => assert_eq!(b.as_ref(), b"xy\0\0\0"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn payload_bytes_exclude_header() {
        let child = BoxNode::raw(FourCC::new(b"abcd"), &b"data"[..]);
        let parent = BoxNode::container(FourCC::new(b"jumb"), vec![child]);
        let payload = parent.payload_bytes().unwrap();
        // the child box in full, but not the parent header
        assert_eq!(&payload[..4], &12u32.to_be_bytes());
        assert_eq!(&payload[4..8], b"abcd");
        assert_eq!(&payload[8..], b"data");
    }
}
