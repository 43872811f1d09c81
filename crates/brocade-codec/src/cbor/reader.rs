//! Pull parser for CBOR.

use bytes::Bytes;
use half::f16;
use num_bigint::{BigInt, Sign};
use smol_str::SmolStr;
use std::collections::HashSet;

use brocade_node::{Event, Node, NodeBuilder, Scalar, node::format_float};

use crate::cbor::CborReadOptions;
use crate::error::{CodecError, Location, Result};
use crate::input::Input;

const MT_UNSIGNED: u8 = 0;
const MT_NEGATIVE: u8 = 1;
const MT_BYTES: u8 = 2;
const MT_TEXT: u8 = 3;
const MT_LIST: u8 = 4;
const MT_MAP: u8 = 5;
const MT_TAG: u8 = 6;
const MT_SIMPLE: u8 = 7;

const BREAK: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Map,
    List,
}

struct Frame {
    kind: FrameKind,
    /// Items (not pairs) left in a definite container; `None` for
    /// indefinite length
    remaining: Option<u64>,
    expect_key: bool,
    seen_keys: HashSet<SmolStr>,
}

/// One decoded data item, before event bookkeeping
enum Item {
    Scalar(Scalar),
    Simple(u8),
    StartList(Option<u64>),
    StartMap(Option<u64>),
    Tag(u64),
    Break,
}

/// Streaming CBOR reader emitting the shared event stream
pub struct CborReader {
    input: Input,
    opts: CborReadOptions,
    stack: Vec<Frame>,
    done: bool,
}

impl CborReader {
    /// Reader over an initial byte chunk
    pub fn new(bytes: &[u8], opts: CborReadOptions) -> CborReader {
        let mut input = Input::new(bytes, opts.partial);
        input.set_budget(opts.byte_budget);
        CborReader {
            input,
            opts,
            stack: Vec::new(),
            done: false,
        }
    }

    /// Feed more bytes to a partial reader
    pub fn push_input(&mut self, bytes: &[u8]) -> Result<()> {
        self.input.push(bytes)
    }

    /// Declare the input complete
    pub fn end_input(&mut self) {
        self.input.end();
    }

    /// True once the document's root has fully closed
    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Bytes of input consumed so far
    pub fn consumed(&self) -> usize {
        self.input.pos()
    }

    /// Error unless the input is fully consumed
    pub(crate) fn expect_end(&self) -> Result<()> {
        if self.input.remaining() > 0 {
            return Err(CodecError::syntax(
                "trailing bytes after document",
                self.location(),
            ));
        }
        Ok(())
    }

    fn location(&self) -> Location {
        Location {
            offset: self.input.pos(),
            line: 0,
            column: 0,
        }
    }

    /// Next event, or `Ok(None)` when a partial input has run dry
    /// between events
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        self.input.check_budget()?;
        if self.done {
            return Ok(None);
        }
        let mark = self.input.pos();
        match self.decode_event() {
            Ok(ev) => {
                if self.stack.is_empty()
                    && !matches!(ev, Event::Tag(_))
                {
                    self.done = true;
                }
                Ok(Some(ev))
            }
            Err(e) if e.is_underrun() && self.input.can_resume() => {
                tracing::trace!(offset = mark, "cbor reader suspended awaiting input");
                self.input.rewind(mark);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drive a builder to completion. Fails with `UnexpectedEnd` if
    /// the input stops early.
    pub fn read_value(&mut self) -> Result<Node> {
        let mut builder = NodeBuilder::new();
        while let Some(ev) = self.next_event()? {
            builder.on_event(ev)?;
            if builder.is_complete() {
                return Ok(builder.take().expect("complete"));
            }
        }
        Err(self.input.underrun())
    }

    fn decode_event(&mut self) -> Result<Event> {
        // a definite container that has consumed all items closes now
        if let Some(top) = self.stack.last()
            && top.remaining == Some(0)
        {
            return Ok(self.close_frame());
        }

        let at_key = self
            .stack
            .last()
            .is_some_and(|f| f.kind == FrameKind::Map && f.expect_key);
        if at_key {
            return self.decode_key();
        }

        let item = self.decode_item()?;
        match item {
            Item::Break => {
                let indefinite = self.stack.last().is_some_and(|f| f.remaining.is_none());
                if !indefinite {
                    return Err(CodecError::syntax(
                        "break outside indefinite container",
                        self.location(),
                    ));
                }
                Ok(self.close_frame())
            }
            Item::Tag(t @ (2 | 3)) => {
                // tags 2/3 promote a byte string to a big integer;
                // any other content falls back to a pass-through tag
                let mark = self.input.pos();
                match self.decode_item() {
                    Ok(Item::Scalar(Scalar::Bytes(bytes))) => {
                        let magnitude = BigInt::from_bytes_be(Sign::Plus, &bytes);
                        let value = if t == 2 { magnitude } else { -magnitude - 1 };
                        self.count_value();
                        Ok(Event::Primitive(Scalar::from_big(value)))
                    }
                    Ok(_) => {
                        self.input.rewind(mark);
                        Ok(Event::Tag(t))
                    }
                    Err(e) => Err(e),
                }
            }
            Item::Tag(t) => Ok(Event::Tag(t)),
            Item::Scalar(s) => {
                self.count_value();
                Ok(Event::Primitive(s))
            }
            Item::Simple(code) => {
                self.count_value();
                Ok(Event::Simple(code))
            }
            Item::StartList(n) => {
                self.open_frame(FrameKind::List, n)?;
                Ok(Event::StartList)
            }
            Item::StartMap(n) => {
                let items = match n {
                    Some(pairs) => Some(pairs.checked_mul(2).ok_or_else(|| {
                        CodecError::syntax("map too large", self.location())
                    })?),
                    None => None,
                };
                self.open_frame(FrameKind::Map, items)?;
                Ok(Event::StartMap)
            }
        }
    }

    fn decode_key(&mut self) -> Result<Event> {
        let item = self.decode_item()?;
        let key: SmolStr = match item {
            Item::Break => {
                let indefinite = self.stack.last().is_some_and(|f| f.remaining.is_none());
                if !indefinite {
                    return Err(CodecError::syntax(
                        "break outside indefinite container",
                        self.location(),
                    ));
                }
                return Ok(self.close_frame());
            }
            Item::Scalar(Scalar::Str(s)) => SmolStr::new(s),
            Item::Scalar(other) => {
                if let Some(reject) = self.opts.on_nonstring_key
                    && !reject(&other)
                {
                    return Err(CodecError::syntax("map key rejected", self.location()));
                }
                SmolStr::new(coerce_key_text(&other))
            }
            Item::Simple(code) => SmolStr::new(format!("simple({code})")),
            _ => {
                return Err(CodecError::syntax(
                    "container or tag used as map key",
                    self.location(),
                ));
            }
        };
        let location = self.location();
        let frame = self.stack.last_mut().expect("key implies frame");
        if !frame.seen_keys.insert(key.clone()) {
            return Err(CodecError::DuplicateKey {
                key: key.to_string(),
                location,
            });
        }
        if let Some(r) = &mut frame.remaining {
            *r -= 1;
        }
        frame.expect_key = false;
        Ok(Event::Key(key))
    }

    fn open_frame(&mut self, kind: FrameKind, remaining: Option<u64>) -> Result<()> {
        if self.stack.len() >= self.opts.max_recursion {
            return Err(CodecError::ResourceLimit { limit: "recursion" });
        }
        self.count_value();
        self.stack.push(Frame {
            kind,
            remaining,
            expect_key: kind == FrameKind::Map,
            seen_keys: HashSet::new(),
        });
        Ok(())
    }

    fn close_frame(&mut self) -> Event {
        let frame = self.stack.pop().expect("close implies frame");
        match frame.kind {
            FrameKind::Map => Event::EndMap,
            FrameKind::List => Event::EndList,
        }
    }

    /// Count one completed value against the enclosing container
    fn count_value(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            if let Some(r) = &mut frame.remaining {
                *r -= 1;
            }
            if frame.kind == FrameKind::Map {
                frame.expect_key = true;
            }
        }
    }

    fn decode_item(&mut self) -> Result<Item> {
        let initial = self.input.take().ok_or_else(|| self.input.underrun())?;
        if initial == BREAK {
            return Ok(Item::Break);
        }
        let mt = initial >> 5;
        let ai = initial & 0x1f;
        match mt {
            MT_UNSIGNED => Ok(Item::Scalar(Scalar::from_u64(self.read_uint(ai)?))),
            MT_NEGATIVE => {
                let n = self.read_uint(ai)?;
                let value = if n <= i64::MAX as u64 {
                    Scalar::from_i64(-(n as i64) - 1)
                } else {
                    Scalar::Big(-BigInt::from(n) - 1)
                };
                Ok(Item::Scalar(value))
            }
            MT_BYTES => Ok(Item::Scalar(Scalar::Bytes(Bytes::from(
                self.read_string(ai, MT_BYTES)?,
            )))),
            MT_TEXT => {
                let start = self.location();
                let raw = self.read_string(ai, MT_TEXT)?;
                let text = String::from_utf8(raw)
                    .map_err(|_| CodecError::syntax("invalid UTF-8 in text string", start))?;
                Ok(Item::Scalar(Scalar::Str(text)))
            }
            MT_LIST => {
                if ai == 31 {
                    Ok(Item::StartList(None))
                } else {
                    Ok(Item::StartList(Some(self.read_uint(ai)?)))
                }
            }
            MT_MAP => {
                if ai == 31 {
                    Ok(Item::StartMap(None))
                } else {
                    Ok(Item::StartMap(Some(self.read_uint(ai)?)))
                }
            }
            MT_TAG => Ok(Item::Tag(self.read_uint(ai)?)),
            MT_SIMPLE => self.decode_simple(ai),
            _ => unreachable!("three-bit major type"),
        }
    }

    fn decode_simple(&mut self, ai: u8) -> Result<Item> {
        match ai {
            0..=19 => Ok(Item::Simple(ai)),
            20 => Ok(Item::Scalar(Scalar::Bool(false))),
            21 => Ok(Item::Scalar(Scalar::Bool(true))),
            22 => Ok(Item::Scalar(Scalar::Null)),
            23 => Ok(Item::Scalar(Scalar::Undefined)),
            24 => {
                let code = self.input.take().ok_or_else(|| self.input.underrun())?;
                if code < 32 {
                    return Err(CodecError::syntax(
                        "two-byte simple value below 32",
                        self.location(),
                    ));
                }
                Ok(Item::Simple(code))
            }
            25 => {
                let raw = self.read_exact::<2>()?;
                Ok(Item::Scalar(Scalar::Float(
                    f16::from_bits(u16::from_be_bytes(raw)).to_f64(),
                )))
            }
            26 => {
                let raw = self.read_exact::<4>()?;
                Ok(Item::Scalar(Scalar::Float(
                    f32::from_be_bytes(raw) as f64,
                )))
            }
            27 => {
                let raw = self.read_exact::<8>()?;
                Ok(Item::Scalar(Scalar::Float(f64::from_be_bytes(raw))))
            }
            _ => Err(CodecError::syntax(
                "reserved additional information",
                self.location(),
            )),
        }
    }

    /// Argument of the initial byte as an unsigned value
    fn read_uint(&mut self, ai: u8) -> Result<u64> {
        match ai {
            0..=23 => Ok(ai as u64),
            24 => Ok(self.input.take().ok_or_else(|| self.input.underrun())? as u64),
            25 => Ok(u16::from_be_bytes(self.read_exact::<2>()?) as u64),
            26 => Ok(u32::from_be_bytes(self.read_exact::<4>()?) as u64),
            27 => Ok(u64::from_be_bytes(self.read_exact::<8>()?)),
            _ => Err(CodecError::syntax(
                "reserved additional information",
                self.location(),
            )),
        }
    }

    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let Some(slice) = self.input.take_n(N) else {
            return Err(self.input.underrun());
        };
        Ok(slice.try_into().expect("length checked"))
    }

    /// Payload of a (possibly indefinite, chunked) string item
    fn read_string(&mut self, ai: u8, mt: u8) -> Result<Vec<u8>> {
        if ai != 31 {
            let len = self.read_uint(ai)?;
            return self.read_chunk(len);
        }
        // indefinite: definite chunks of the same major type until break
        let mut out = Vec::new();
        loop {
            let initial = self.input.take().ok_or_else(|| self.input.underrun())?;
            if initial == BREAK {
                return Ok(out);
            }
            if initial >> 5 != mt || initial & 0x1f == 31 {
                return Err(CodecError::syntax(
                    "indefinite string chunk of mismatched type",
                    self.location(),
                ));
            }
            let len = self.read_uint(initial & 0x1f)?;
            if out.len() as u64 + len > self.opts.max_string_length as u64 {
                return Err(CodecError::ResourceLimit {
                    limit: "string length",
                });
            }
            out.extend_from_slice(&self.read_chunk(len)?);
        }
    }

    fn read_chunk(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > self.opts.max_string_length as u64 {
            return Err(CodecError::ResourceLimit {
                limit: "string length",
            });
        }
        let Some(slice) = self.input.take_n(len as usize) else {
            return Err(self.input.underrun());
        };
        Ok(slice.to_vec())
    }
}

/// Canonical text of a non-string map key
fn coerce_key_text(scalar: &Scalar) -> String {
    use base64::Engine;
    match scalar {
        Scalar::Str(s) => s.clone(),
        Scalar::Int(v) => v.to_string(),
        Scalar::Long(v) => v.to_string(),
        Scalar::Big(v) => v.to_string(),
        Scalar::Float(v) => format_float(*v),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Null => "null".to_string(),
        Scalar::Undefined => "undefined".to_string(),
        Scalar::Bytes(b) => base64::prelude::BASE64_STANDARD.encode(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::from_slice;
    use brocade_node::Value;

    fn parse_hex(h: &str) -> Node {
        from_slice(&hex::decode(h).expect("hex")).expect("parse")
    }

    #[test]
    fn integers_narrow() {
        assert_eq!(parse_hex("00").int_value().unwrap(), 0);
        assert_eq!(parse_hex("17").int_value().unwrap(), 23);
        assert_eq!(parse_hex("1818").int_value().unwrap(), 24);
        assert_eq!(parse_hex("1903e8").int_value().unwrap(), 1000);
        assert_eq!(parse_hex("20").int_value().unwrap(), -1);
        assert_eq!(parse_hex("3863").int_value().unwrap(), -100);
        let big = parse_hex("1b000000e8d4a51000");
        assert_eq!(big.long_value().unwrap(), 1_000_000_000_000);
        assert_eq!(big.type_name(), "number");
    }

    #[test]
    fn sixty_four_bit_boundary() {
        let n = parse_hex("1bffffffffffffffff");
        n.with_value(|v| assert!(matches!(v, Value::Big(_))));
        assert_eq!(n.string_value().unwrap(), "18446744073709551615");
        let n = parse_hex("3bffffffffffffffff");
        n.with_value(|v| assert!(matches!(v, Value::Big(_))));
        assert_eq!(n.string_value().unwrap(), "-18446744073709551616");
    }

    #[test]
    fn bignum_tags_promote() {
        let n = parse_hex("c249010000000000000000");
        assert_eq!(n.string_value().unwrap(), "18446744073709551616");
        assert_eq!(n.tag(), None);
        let n = parse_hex("c349010000000000000000");
        assert_eq!(n.string_value().unwrap(), "-18446744073709551617");
        // a small bignum narrows to the int variant
        let n = parse_hex("c24101");
        n.with_value(|v| assert!(matches!(v, Value::Int(1))));
    }

    #[test]
    fn floats_and_halfs() {
        assert_eq!(parse_hex("f93c00").double_value().unwrap(), 1.0);
        assert_eq!(parse_hex("f97bff").double_value().unwrap(), 65504.0);
        // smallest positive f16 subnormal
        assert_eq!(
            parse_hex("f90001").double_value().unwrap(),
            5.960464477539063e-8
        );
        assert_eq!(parse_hex("fa47c35000").double_value().unwrap(), 100000.0);
        assert_eq!(
            parse_hex("fb3ff199999999999a").double_value().unwrap(),
            1.1
        );
        assert!(parse_hex("f97e00").double_value().unwrap().is_nan());
        assert_eq!(
            parse_hex("f97c00").double_value().unwrap(),
            f64::INFINITY
        );
    }

    #[test]
    fn strings_and_buffers() {
        assert_eq!(parse_hex("6449455446").string_value().unwrap(), "IETF");
        assert_eq!(parse_hex("62c3bc").string_value().unwrap(), "ü");
        assert_eq!(
            parse_hex("4401020304").buffer_value().unwrap().as_ref(),
            &[1, 2, 3, 4]
        );
        assert_eq!(parse_hex("40").buffer_value().unwrap().len(), 0);
    }

    #[test]
    fn containers() {
        let n = parse_hex("8301820203820405");
        assert_eq!(n.size(), 3);
        assert_eq!(n.get("[1][0]").unwrap().int_value().unwrap(), 2);
        assert_eq!(n.get("[2][1]").unwrap().int_value().unwrap(), 5);
        let n = parse_hex("a26161016162820203");
        assert_eq!(n.get("a").unwrap().int_value().unwrap(), 1);
        assert_eq!(n.get("b").unwrap().size(), 2);
        assert_eq!(parse_hex("a0").size(), 0);
        assert_eq!(parse_hex("80").size(), 0);
    }

    #[test]
    fn indefinite_forms() {
        let n = parse_hex("5f42010243030405ff");
        assert_eq!(n.buffer_value().unwrap().as_ref(), &[1, 2, 3, 4, 5]);
        let n = parse_hex("7f657374726561646d696e67ff");
        assert_eq!(n.string_value().unwrap(), "streaming");
        let n = parse_hex("9f018202039f0405ffff");
        assert_eq!(n.size(), 3);
        assert_eq!(n.get("[2][1]").unwrap().int_value().unwrap(), 5);
        let n = parse_hex("bf6346756ef563416d7421ff");
        assert!(n.get("Fun").unwrap().boolean_value().unwrap());
        assert_eq!(n.get("Amt").unwrap().int_value().unwrap(), -2);
    }

    #[test]
    fn nonstring_keys_coerce() {
        let n = parse_hex("a201020304");
        assert_eq!(n.get("[\"1\"]").unwrap().int_value().unwrap(), 2);
        assert_eq!(n.get("[\"3\"]").unwrap().int_value().unwrap(), 4);
    }

    #[test]
    fn nonstring_key_hook_can_reject() {
        let opts = CborReadOptions::builder()
            .on_nonstring_key((|_s: &Scalar| false) as fn(&Scalar) -> bool)
            .build();
        let bytes = hex::decode("a201020304").unwrap();
        let mut reader = CborReader::new(&bytes, opts);
        assert!(matches!(
            reader.read_value().unwrap_err(),
            CodecError::Syntax { .. }
        ));
    }

    #[test]
    fn duplicate_keys_fail() {
        let err = from_slice(&hex::decode("a26161016161 02".replace(' ', "")).unwrap())
            .unwrap_err();
        assert!(matches!(err, CodecError::DuplicateKey { key, .. } if key == "a"));
    }

    #[test]
    fn unknown_tag_passes_through() {
        let n = parse_hex("c11a514b67b0");
        assert_eq!(n.tag(), Some(1));
        assert_eq!(n.long_value().unwrap(), 1363896240);
    }

    #[test]
    fn unknown_simple_is_coded_undefined() {
        let n = parse_hex("f0");
        assert_eq!(n.type_name(), "undefined");
        n.with_value(|v| assert!(matches!(v, Value::Undefined(Some(16)))));
        let n = parse_hex("f8ff");
        n.with_value(|v| assert!(matches!(v, Value::Undefined(Some(255)))));
    }

    #[test]
    fn core_simples() {
        assert!(!parse_hex("f4").boolean_value().unwrap());
        assert!(parse_hex("f5").boolean_value().unwrap());
        assert_eq!(parse_hex("f6").type_name(), "null");
        let n = parse_hex("f7");
        n.with_value(|v| assert!(matches!(v, Value::Undefined(None))));
    }

    #[test]
    fn partial_input_resumes() {
        let bytes = hex::decode("a26161016162820203").unwrap();
        let opts = CborReadOptions::builder().partial(true).build();
        let mut reader = CborReader::new(&bytes[..3], opts);
        let mut builder = NodeBuilder::new();
        let mut fed = 3;
        loop {
            match reader.next_event().expect("event") {
                Some(ev) => builder.on_event(ev).expect("build"),
                None => {
                    assert!(fed < bytes.len(), "reader stalled with full input");
                    let next = (fed + 2).min(bytes.len());
                    reader.push_input(&bytes[fed..next]).expect("push");
                    fed = next;
                }
            }
            if builder.is_complete() {
                break;
            }
        }
        let node = builder.take().unwrap();
        assert_eq!(node.get("a").unwrap().int_value().unwrap(), 1);
        assert_eq!(node.get("b[1]").unwrap().int_value().unwrap(), 3);
    }

    #[test]
    fn truncated_input_fails_when_not_partial() {
        let err = from_slice(&hex::decode("a261").unwrap()).unwrap_err();
        assert!(err.is_underrun());
    }

    #[test]
    fn recursion_limit_enforced() {
        let mut bytes = vec![0x81u8; 80];
        bytes.push(0x00);
        let mut reader = CborReader::new(&bytes, CborReadOptions::default());
        assert!(matches!(
            reader.read_value().unwrap_err(),
            CodecError::ResourceLimit { limit: "recursion" }
        ));
    }

    #[test]
    fn string_length_limit_enforced() {
        let opts = CborReadOptions::builder().max_string_length(4).build();
        let bytes = hex::decode("6449455446").unwrap();
        let mut reader = CborReader::new(&bytes, opts.clone());
        assert!(reader.read_value().is_ok());
        // five characters is one too many
        let bytes = hex::decode("655374726561").unwrap();
        let mut reader = CborReader::new(&bytes, opts);
        assert!(matches!(
            reader.read_value().unwrap_err(),
            CodecError::ResourceLimit { .. }
        ));
    }

    #[test]
    fn byte_budget_enforced() {
        let opts = CborReadOptions::builder().byte_budget(4).build();
        let bytes = hex::decode("6449455446").unwrap();
        let mut reader = CborReader::new(&bytes, opts);
        assert!(matches!(
            reader.read_value().unwrap_err(),
            CodecError::ResourceLimit { .. }
        ));
    }
}
