//! Pull parser for MsgPack.

use bytes::Bytes;
use smol_str::SmolStr;

use brocade_node::{Event, Node, NodeBuilder, Scalar, node::format_float};

use crate::error::{CodecError, Location, Result};
use crate::input::Input;
use crate::msgpack::MsgPackReadOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Map,
    List,
}

struct Frame {
    kind: FrameKind,
    /// Items (not pairs) left in the container
    remaining: u64,
    expect_key: bool,
}

enum Item {
    Scalar(Scalar),
    /// Ext payload with its type code
    Ext(i8, Bytes),
    StartList(u64),
    StartMap(u64),
}

/// Streaming MsgPack reader emitting the shared event stream
pub struct MsgPackReader {
    input: Input,
    opts: MsgPackReadOptions,
    stack: Vec<Frame>,
    done: bool,
    /// Ext produces two events (tag, then buffer); the second is
    /// parked here between calls
    pending: Option<Event>,
}

impl MsgPackReader {
    /// Reader over an initial byte chunk
    pub fn new(bytes: &[u8], opts: MsgPackReadOptions) -> MsgPackReader {
        let mut input = Input::new(bytes, opts.partial);
        input.set_budget(opts.byte_budget);
        MsgPackReader {
            input,
            opts,
            stack: Vec::new(),
            done: false,
            pending: None,
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
        self.done && self.pending.is_none()
    }

    /// Bytes of input consumed so far
    pub fn consumed(&self) -> usize {
        self.input.pos()
    }

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
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        self.input.check_budget()?;
        if let Some(ev) = self.pending.take() {
            if self.stack.is_empty() {
                self.done = true;
            }
            return Ok(Some(ev));
        }
        if self.done {
            return Ok(None);
        }
        let mark = self.input.pos();
        match self.decode_event() {
            Ok(ev) => {
                if self.stack.is_empty() && !matches!(ev, Event::Tag(_)) {
                    self.done = true;
                }
                Ok(Some(ev))
            }
            Err(e) if e.is_underrun() && self.input.can_resume() => {
                tracing::trace!(offset = mark, "msgpack reader suspended awaiting input");
                self.input.rewind(mark);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drive a builder to completion
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
        if let Some(top) = self.stack.last()
            && top.remaining == 0
        {
            let frame = self.stack.pop().expect("checked");
            return Ok(match frame.kind {
                FrameKind::Map => Event::EndMap,
                FrameKind::List => Event::EndList,
            });
        }

        let at_key = self
            .stack
            .last()
            .is_some_and(|f| f.kind == FrameKind::Map && f.expect_key);
        let item = self.decode_item()?;
        if at_key {
            let key: SmolStr = match item {
                Item::Scalar(Scalar::Str(s)) => SmolStr::new(s),
                Item::Scalar(other) => SmolStr::new(key_text(&other)),
                Item::Ext(..) | Item::StartList(_) | Item::StartMap(_) => {
                    return Err(CodecError::syntax(
                        "container or ext used as map key",
                        self.location(),
                    ));
                }
            };
            let frame = self.stack.last_mut().expect("key implies frame");
            frame.remaining -= 1;
            frame.expect_key = false;
            return Ok(Event::Key(key));
        }

        match item {
            Item::Scalar(s) => {
                self.count_value();
                Ok(Event::Primitive(s))
            }
            Item::Ext(code, payload) => {
                self.count_value();
                self.pending = Some(Event::Primitive(Scalar::Bytes(payload)));
                Ok(Event::Tag((code as u8) as u64))
            }
            Item::StartList(n) => {
                self.open_frame(FrameKind::List, n)?;
                Ok(Event::StartList)
            }
            Item::StartMap(n) => {
                self.open_frame(FrameKind::Map, n.checked_mul(2).ok_or_else(|| {
                    CodecError::syntax("map too large", self.location())
                })?)?;
                Ok(Event::StartMap)
            }
        }
    }

    fn open_frame(&mut self, kind: FrameKind, remaining: u64) -> Result<()> {
        if self.stack.len() >= self.opts.max_recursion {
            return Err(CodecError::ResourceLimit { limit: "recursion" });
        }
        self.count_value();
        self.stack.push(Frame {
            kind,
            remaining,
            expect_key: kind == FrameKind::Map,
        });
        Ok(())
    }

    fn count_value(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.remaining -= 1;
            if frame.kind == FrameKind::Map {
                frame.expect_key = true;
            }
        }
    }

    fn decode_item(&mut self) -> Result<Item> {
        let b = self.input.take().ok_or_else(|| self.input.underrun())?;
        match b {
            0x00..=0x7f => Ok(Item::Scalar(Scalar::Int(b as i32))),
            0xe0..=0xff => Ok(Item::Scalar(Scalar::Int(b as i8 as i32))),
            0x80..=0x8f => Ok(Item::StartMap((b & 0x0f) as u64)),
            0x90..=0x9f => Ok(Item::StartList((b & 0x0f) as u64)),
            0xa0..=0xbf => self.text((b & 0x1f) as u64),
            0xc0 => Ok(Item::Scalar(Scalar::Null)),
            0xc1 => Err(CodecError::syntax("reserved format 0xc1", self.location())),
            0xc2 => Ok(Item::Scalar(Scalar::Bool(false))),
            0xc3 => Ok(Item::Scalar(Scalar::Bool(true))),
            0xc4 => {
                let len = self.read_len::<1>()?;
                self.bin(len)
            }
            0xc5 => {
                let len = self.read_len::<2>()?;
                self.bin(len)
            }
            0xc6 => {
                let len = self.read_len::<4>()?;
                self.bin(len)
            }
            0xc7 => {
                let len = self.read_len::<1>()?;
                self.ext(len)
            }
            0xc8 => {
                let len = self.read_len::<2>()?;
                self.ext(len)
            }
            0xc9 => {
                let len = self.read_len::<4>()?;
                self.ext(len)
            }
            0xca => {
                let raw = self.read_exact::<4>()?;
                Ok(Item::Scalar(Scalar::Float(f32::from_be_bytes(raw) as f64)))
            }
            0xcb => {
                let raw = self.read_exact::<8>()?;
                Ok(Item::Scalar(Scalar::Float(f64::from_be_bytes(raw))))
            }
            0xcc => Ok(Item::Scalar(Scalar::from_u64(self.read_len::<1>()?))),
            0xcd => Ok(Item::Scalar(Scalar::from_u64(self.read_len::<2>()?))),
            0xce => Ok(Item::Scalar(Scalar::from_u64(self.read_len::<4>()?))),
            0xcf => Ok(Item::Scalar(Scalar::from_u64(self.read_len::<8>()?))),
            0xd0 => {
                let raw = self.read_exact::<1>()?;
                Ok(Item::Scalar(Scalar::Int(raw[0] as i8 as i32)))
            }
            0xd1 => {
                let raw = self.read_exact::<2>()?;
                Ok(Item::Scalar(Scalar::Int(i16::from_be_bytes(raw) as i32)))
            }
            0xd2 => {
                let raw = self.read_exact::<4>()?;
                Ok(Item::Scalar(Scalar::Int(i32::from_be_bytes(raw))))
            }
            0xd3 => {
                let raw = self.read_exact::<8>()?;
                Ok(Item::Scalar(Scalar::from_i64(i64::from_be_bytes(raw))))
            }
            0xd4 => self.ext(1),
            0xd5 => self.ext(2),
            0xd6 => self.ext(4),
            0xd7 => self.ext(8),
            0xd8 => self.ext(16),
            0xd9 => {
                let len = self.read_len::<1>()?;
                self.text(len)
            }
            0xda => {
                let len = self.read_len::<2>()?;
                self.text(len)
            }
            0xdb => {
                let len = self.read_len::<4>()?;
                self.text(len)
            }
            0xdc => Ok(Item::StartList(self.read_len::<2>()?)),
            0xdd => Ok(Item::StartList(self.read_len::<4>()?)),
            0xde => Ok(Item::StartMap(self.read_len::<2>()?)),
            0xdf => Ok(Item::StartMap(self.read_len::<4>()?)),
        }
    }

    fn read_len<const N: usize>(&mut self) -> Result<u64> {
        let raw = self.read_exact::<N>()?;
        let mut v = 0u64;
        for b in raw {
            v = (v << 8) | b as u64;
        }
        Ok(v)
    }

    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let Some(slice) = self.input.take_n(N) else {
            return Err(self.input.underrun());
        };
        Ok(slice.try_into().expect("length checked"))
    }

    fn payload(&mut self, len: u64) -> Result<Vec<u8>> {
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

    fn text(&mut self, len: u64) -> Result<Item> {
        let start = self.location();
        let raw = self.payload(len)?;
        let text = String::from_utf8(raw)
            .map_err(|_| CodecError::syntax("invalid UTF-8 in str", start))?;
        Ok(Item::Scalar(Scalar::Str(text)))
    }

    fn bin(&mut self, len: u64) -> Result<Item> {
        Ok(Item::Scalar(Scalar::Bytes(Bytes::from(self.payload(len)?))))
    }

    fn ext(&mut self, len: u64) -> Result<Item> {
        let code = self.read_exact::<1>()?[0] as i8;
        let payload = self.payload(len)?;
        Ok(Item::Ext(code, Bytes::from(payload)))
    }
}

fn key_text(scalar: &Scalar) -> String {
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
    use crate::msgpack::from_slice;
    use brocade_node::Value;

    fn parse_hex(h: &str) -> Node {
        from_slice(&hex::decode(h).expect("hex")).expect("parse")
    }

    #[test]
    fn fixints() {
        assert_eq!(parse_hex("00").int_value().unwrap(), 0);
        assert_eq!(parse_hex("7f").int_value().unwrap(), 127);
        assert_eq!(parse_hex("ff").int_value().unwrap(), -1);
        assert_eq!(parse_hex("e0").int_value().unwrap(), -32);
    }

    #[test]
    fn sized_integers() {
        assert_eq!(parse_hex("cc80").int_value().unwrap(), 128);
        assert_eq!(parse_hex("cd0100").int_value().unwrap(), 256);
        assert_eq!(parse_hex("ce00010000").int_value().unwrap(), 65536);
        assert_eq!(
            parse_hex("cf0000000100000000").long_value().unwrap(),
            1 << 32
        );
        let top = parse_hex("cfffffffffffffffff");
        top.with_value(|v| assert!(matches!(v, Value::Big(_))));
        assert_eq!(parse_hex("d085").int_value().unwrap(), -123);
        assert_eq!(parse_hex("d1ff00").int_value().unwrap(), -256);
        assert_eq!(parse_hex("d2ffff0000").long_value().unwrap(), -65536);
        assert_eq!(
            parse_hex("d3ffffffff00000000").long_value().unwrap(),
            -(1i64 << 32)
        );
    }

    #[test]
    fn floats() {
        assert_eq!(parse_hex("ca3fc00000").double_value().unwrap(), 1.5);
        assert_eq!(
            parse_hex("cb3ff199999999999a").double_value().unwrap(),
            1.1
        );
    }

    #[test]
    fn nil_bool_str_bin() {
        assert_eq!(parse_hex("c0").type_name(), "null");
        assert!(parse_hex("c3").boolean_value().unwrap());
        assert_eq!(parse_hex("a568656c6c6f").string_value().unwrap(), "hello");
        assert_eq!(
            parse_hex("d9203031323334353637383930313233343536373839303132333435363738396162")
                .string_value()
                .unwrap()
                .len(),
            32
        );
        assert_eq!(
            parse_hex("c403010203").buffer_value().unwrap().as_ref(),
            &[1, 2, 3]
        );
    }

    #[test]
    fn containers() {
        let n = parse_hex("82a16101a162920203");
        assert_eq!(n.get("a").unwrap().int_value().unwrap(), 1);
        assert_eq!(n.get("b[1]").unwrap().int_value().unwrap(), 3);
        let n = parse_hex("dc00110102030405060708090a0b0c0d0e0f1011");
        assert_eq!(n.size(), 17);
        assert_eq!(n.get("[16]").unwrap().int_value().unwrap(), 17);
    }

    #[test]
    fn ext_is_tagged_buffer() {
        // fixext4, type 5
        let n = parse_hex("d605deadbeef");
        assert_eq!(n.tag(), Some(5));
        assert_eq!(
            n.buffer_value().unwrap().as_ref(),
            &[0xde, 0xad, 0xbe, 0xef]
        );
    }

    #[test]
    fn timestamp_ext_stays_raw() {
        // fixext4, type -1: 32-bit seconds timestamp
        let n = parse_hex("d6ff5e0be100");
        assert_eq!(n.tag(), Some(255));
        assert_eq!(n.type_name(), "buffer");
        assert_eq!(n.buffer_value().unwrap().len(), 4);
    }

    #[test]
    fn nonstring_keys_coerce() {
        let n = parse_hex("81017b");
        assert_eq!(n.get("[\"1\"]").unwrap().int_value().unwrap(), 123);
    }

    #[test]
    fn reserved_byte_rejected() {
        assert!(matches!(
            from_slice(&[0xc1]).unwrap_err(),
            CodecError::Syntax { .. }
        ));
    }

    #[test]
    fn partial_input_resumes() {
        let bytes = hex::decode("82a16101a162920203").unwrap();
        let opts = MsgPackReadOptions::builder().partial(true).build();
        let mut reader = MsgPackReader::new(&bytes[..1], opts);
        let mut builder = NodeBuilder::new();
        let mut fed = 1;
        while !builder.is_complete() {
            match reader.next_event().expect("event") {
                Some(ev) => builder.on_event(ev).expect("build"),
                None => {
                    assert!(fed < bytes.len(), "reader stalled with full input");
                    reader.push_input(&bytes[fed..fed + 1]).expect("push");
                    fed += 1;
                }
            }
        }
        let node = builder.take().unwrap();
        assert_eq!(node.get("b[0]").unwrap().int_value().unwrap(), 2);
    }
}
