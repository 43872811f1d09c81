//! C2PA-in-JPEG: APP11 segment chunking and reassembly.
//!
//! The encoded store is split across APP11 (`FF EB`) segments. Every
//! segment repeats the header `"JP" | instance(2) | sequence(4) |
//! LBox(4) | TBox(4)`; payload chunks concatenate in sequence order.
//! Segments sit after the initial APP0 run and before start-of-scan.

use crate::error::{BoxError, Result};

const MARKER_SOI: u8 = 0xd8;
const MARKER_APP0: u8 = 0xe0;
const MARKER_APP11: u8 = 0xeb;
const MARKER_SOS: u8 = 0xda;

/// Fixed per-segment overhead after the two-byte segment length:
/// CI(2) + En(2) + Z(4) + LBox(4) + TBox(4)
const SEGMENT_HEADER: usize = 16;
/// Largest payload chunk one segment can carry
const MAX_CHUNK: usize = 65535 - 2 - SEGMENT_HEADER;

struct Segment<'a> {
    instance: u16,
    sequence: u32,
    lbox: [u8; 4],
    tbox: [u8; 4],
    chunk: &'a [u8],
}

/// Reassemble the embedded box from APP11 segments. When several box
/// instances are present, the first one encountered is active.
pub fn extract_store(jpeg: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut active: Option<u16> = None;
    for (marker, body) in scan_segments(jpeg)? {
        if marker != MARKER_APP11 || body.len() < SEGMENT_HEADER || &body[..2] != b"JP" {
            continue;
        }
        let instance = u16::from_be_bytes(body[2..4].try_into().expect("checked"));
        let sequence = u32::from_be_bytes(body[4..8].try_into().expect("checked"));
        let lbox: [u8; 4] = body[8..12].try_into().expect("checked");
        let tbox: [u8; 4] = body[12..16].try_into().expect("checked");
        let active = *active.get_or_insert(instance);
        if instance != active {
            continue;
        }
        segments.push(Segment {
            instance,
            sequence,
            lbox,
            tbox,
            chunk: &body[SEGMENT_HEADER..],
        });
    }
    let Some(first) = segments.first() else {
        return Ok(None);
    };
    let (lbox, tbox, instance) = (first.lbox, first.tbox, first.instance);
    if segments
        .iter()
        .any(|s| s.lbox != lbox || s.tbox != tbox || s.instance != instance)
    {
        return Err(BoxError::Jpeg("inconsistent APP11 box headers"));
    }
    segments.sort_by_key(|s| s.sequence);
    tracing::debug!(
        segments = segments.len(),
        instance,
        "reassembling APP11 store"
    );
    let mut out = Vec::new();
    out.extend_from_slice(&lbox);
    out.extend_from_slice(&tbox);
    for segment in &segments {
        out.extend_from_slice(segment.chunk);
    }
    Ok(Some(out))
}

/// Embed an encoded box, chunked into APP11 segments after the APP0
/// run. Existing APP11 C2PA segments are replaced.
pub fn embed_store(jpeg: &[u8], box_bytes: &[u8]) -> Result<Vec<u8>> {
    if box_bytes.len() < 8 {
        return Err(BoxError::Jpeg("box too short to embed"));
    }
    let lbox = &box_bytes[..4];
    let tbox = &box_bytes[4..8];
    let body = &box_bytes[8..];

    let insert_at = insertion_point(jpeg)?;
    let mut out = Vec::with_capacity(jpeg.len() + box_bytes.len() + 64);
    push_filtered(&mut out, &jpeg[..insert_at])?;

    let chunks: Vec<&[u8]> = if body.is_empty() {
        vec![&[][..]]
    } else {
        body.chunks(MAX_CHUNK).collect()
    };
    for (i, chunk) in chunks.iter().enumerate() {
        out.push(0xff);
        out.push(MARKER_APP11);
        let seg_len = 2 + SEGMENT_HEADER + chunk.len();
        out.extend_from_slice(&(seg_len as u16).to_be_bytes());
        out.extend_from_slice(b"JP");
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(1 + i as u32).to_be_bytes());
        out.extend_from_slice(lbox);
        out.extend_from_slice(tbox);
        out.extend_from_slice(chunk);
    }

    push_filtered(&mut out, &jpeg[insert_at..])?;
    Ok(out)
}

/// Copy JPEG bytes, dropping any existing APP11 "JP" segments
fn push_filtered(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let mut at = 0usize;
    while at < bytes.len() {
        if at + 4 <= bytes.len() && bytes[at] == 0xff && bytes[at + 1] == MARKER_APP11 {
            let len =
                u16::from_be_bytes(bytes[at + 2..at + 4].try_into().expect("checked")) as usize;
            if at + 2 + len <= bytes.len() && bytes.get(at + 4..at + 6) == Some(b"JP") {
                at += 2 + len;
                continue;
            }
        }
        out.push(bytes[at]);
        at += 1;
    }
    Ok(())
}

/// Iterate marker segments up to start-of-scan
fn scan_segments(jpeg: &[u8]) -> Result<Vec<(u8, &[u8])>> {
    if jpeg.len() < 2 || jpeg[0] != 0xff || jpeg[1] != MARKER_SOI {
        return Err(BoxError::Jpeg("missing SOI marker"));
    }
    let mut out = Vec::new();
    let mut at = 2usize;
    while at + 1 < jpeg.len() {
        if jpeg[at] != 0xff {
            return Err(BoxError::Jpeg("expected marker"));
        }
        let marker = jpeg[at + 1];
        match marker {
            // fill byte or standalone markers
            0xff => {
                at += 1;
                continue;
            }
            0x01 | 0xd0..=0xd9 => {
                at += 2;
                continue;
            }
            MARKER_SOS => return Ok(out),
            _ => {}
        }
        if at + 4 > jpeg.len() {
            return Err(BoxError::Jpeg("truncated segment header"));
        }
        let len = u16::from_be_bytes(jpeg[at + 2..at + 4].try_into().expect("checked")) as usize;
        if len < 2 || at + 2 + len > jpeg.len() {
            return Err(BoxError::Jpeg("truncated segment"));
        }
        out.push((marker, &jpeg[at + 4..at + 2 + len]));
        at += 2 + len;
    }
    Ok(out)
}

/// Offset just after the SOI marker and any contiguous APP0 segments
fn insertion_point(jpeg: &[u8]) -> Result<usize> {
    if jpeg.len() < 2 || jpeg[0] != 0xff || jpeg[1] != MARKER_SOI {
        return Err(BoxError::Jpeg("missing SOI marker"));
    }
    let mut at = 2usize;
    while at + 4 <= jpeg.len() && jpeg[at] == 0xff && jpeg[at + 1] == MARKER_APP0 {
        let len = u16::from_be_bytes(jpeg[at + 2..at + 4].try_into().expect("checked")) as usize;
        if len < 2 || at + 2 + len > jpeg.len() {
            return Err(BoxError::Jpeg("truncated APP0 segment"));
        }
        at += 2 + len;
    }
    Ok(at)
}
