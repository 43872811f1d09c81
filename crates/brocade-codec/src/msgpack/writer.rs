//! MsgPack writer with smallest-format integer selection.

use num_traits::ToPrimitive;

use brocade_node::{Event, Node, Scalar, Value};

use crate::error::{CodecError, Result};
use crate::msgpack::MsgPackWriteOptions;

/// Push-style MsgPack writer.
///
/// Ext values come from buffer nodes carrying a tag in `0..=255`; the
/// tag byte is written back as the ext type code. Undefined nodes have
/// no MsgPack shape and degrade to `nil`.
pub struct MsgPackWriter {
    out: Vec<u8>,
    opts: MsgPackWriteOptions,
}

impl MsgPackWriter {
    /// Fresh writer
    pub fn new(opts: MsgPackWriteOptions) -> MsgPackWriter {
        MsgPackWriter {
            out: Vec::new(),
            opts,
        }
    }

    /// The encoded document
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// Encode a finished tree
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        self.node(node, 0)
    }

    fn node(&mut self, node: &Node, depth: usize) -> Result<()> {
        if depth > self.opts.max_recursion {
            return Err(CodecError::ResourceLimit { limit: "recursion" });
        }
        let tag = node.tag();
        node.with_value(|value| match value {
            Value::Null | Value::Undefined(_) => {
                self.out.push(0xc0);
                Ok(())
            }
            Value::Bool(b) => {
                self.out.push(if *b { 0xc3 } else { 0xc2 });
                Ok(())
            }
            Value::Int(v) => {
                self.int(*v as i64);
                Ok(())
            }
            Value::Long(v) => {
                self.int(*v);
                Ok(())
            }
            Value::Big(b) => {
                if let Some(v) = b.to_u64() {
                    self.uint(v);
                    Ok(())
                } else if let Some(v) = b.to_i64() {
                    self.int(v);
                    Ok(())
                } else {
                    Err(CodecError::Unsupported {
                        what: "integer beyond 64 bits in msgpack",
                    })
                }
            }
            Value::Float(f) => {
                self.float(*f);
                Ok(())
            }
            Value::String(s) => self.str_bytes(s),
            Value::Buffer(b) => match tag {
                Some(code @ 0..=255) => self.ext(code as u8 as i8, b),
                Some(_) => Err(CodecError::Unsupported {
                    what: "ext type code beyond one byte",
                }),
                None => self.bin(b),
            },
            Value::List(_) => {
                let items = node.items().expect("list");
                self.list_head(items.len() as u64)?;
                for item in &items {
                    self.node(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Map(_) => {
                let mut entries = node.entries().expect("map");
                if self.opts.sorted {
                    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                }
                self.map_head(entries.len() as u64)?;
                for (key, child) in &entries {
                    self.str_bytes(key)?;
                    self.node(child, depth + 1)?;
                }
                Ok(())
            }
        })
    }

    /// Encode one raw event. MsgPack has no indefinite containers, so
    /// event-mode writing only accepts primitives, keys and tags that
    /// an ext buffer follows; container events are rejected.
    pub fn event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Primitive(Scalar::Str(s)) => self.str_bytes(s),
            Event::Primitive(Scalar::Bytes(b)) => self.bin(b),
            Event::Primitive(Scalar::Null | Scalar::Undefined) => {
                self.out.push(0xc0);
                Ok(())
            }
            Event::Primitive(Scalar::Bool(b)) => {
                self.out.push(if *b { 0xc3 } else { 0xc2 });
                Ok(())
            }
            Event::Primitive(Scalar::Int(v)) => {
                self.int(*v as i64);
                Ok(())
            }
            Event::Primitive(Scalar::Long(v)) => {
                self.int(*v);
                Ok(())
            }
            Event::Primitive(Scalar::Float(f)) => {
                self.float(*f);
                Ok(())
            }
            Event::Key(k) => self.str_bytes(k),
            _ => Err(CodecError::Unsupported {
                what: "container framing in msgpack event mode",
            }),
        }
    }

    fn int(&mut self, v: i64) {
        if v >= 0 {
            self.uint(v as u64);
            return;
        }
        match v {
            -32..=-1 => self.out.push(v as u8),
            -128..=-33 => {
                self.out.push(0xd0);
                self.out.push(v as u8);
            }
            -32768..=-129 => {
                self.out.push(0xd1);
                self.out.extend_from_slice(&(v as i16).to_be_bytes());
            }
            -2147483648..=-32769 => {
                self.out.push(0xd2);
                self.out.extend_from_slice(&(v as i32).to_be_bytes());
            }
            _ => {
                self.out.push(0xd3);
                self.out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }

    fn uint(&mut self, v: u64) {
        match v {
            0..=0x7f => self.out.push(v as u8),
            0x80..=0xff => {
                self.out.push(0xcc);
                self.out.push(v as u8);
            }
            0x100..=0xffff => {
                self.out.push(0xcd);
                self.out.extend_from_slice(&(v as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.out.push(0xce);
                self.out.extend_from_slice(&(v as u32).to_be_bytes());
            }
            _ => {
                self.out.push(0xcf);
                self.out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }

    fn float(&mut self, f: f64) {
        let single = f as f32;
        if single as f64 == f || f.is_nan() && single.is_nan() {
            self.out.push(0xca);
            self.out.extend_from_slice(&single.to_be_bytes());
        } else {
            self.out.push(0xcb);
            self.out.extend_from_slice(&f.to_be_bytes());
        }
    }

    fn str_bytes(&mut self, s: &str) -> Result<()> {
        let len = s.len();
        match len {
            0..=31 => self.out.push(0xa0 | len as u8),
            32..=0xff => {
                self.out.push(0xd9);
                self.out.push(len as u8);
            }
            0x100..=0xffff => {
                self.out.push(0xda);
                self.out.extend_from_slice(&(len as u16).to_be_bytes());
            }
            _ => {
                self.out.push(0xdb);
                self.out
                    .extend_from_slice(&u32::try_from(len).map_err(|_| {
                        CodecError::Unsupported {
                            what: "string beyond 4 GiB",
                        }
                    })?
                    .to_be_bytes());
            }
        }
        self.out.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn bin(&mut self, b: &[u8]) -> Result<()> {
        let len = b.len();
        match len {
            0..=0xff => {
                self.out.push(0xc4);
                self.out.push(len as u8);
            }
            0x100..=0xffff => {
                self.out.push(0xc5);
                self.out.extend_from_slice(&(len as u16).to_be_bytes());
            }
            _ => {
                self.out.push(0xc6);
                self.out
                    .extend_from_slice(&u32::try_from(len).map_err(|_| {
                        CodecError::Unsupported {
                            what: "buffer beyond 4 GiB",
                        }
                    })?
                    .to_be_bytes());
            }
        }
        self.out.extend_from_slice(b);
        Ok(())
    }

    fn ext(&mut self, code: i8, b: &[u8]) -> Result<()> {
        match b.len() {
            1 => self.out.push(0xd4),
            2 => self.out.push(0xd5),
            4 => self.out.push(0xd6),
            8 => self.out.push(0xd7),
            16 => self.out.push(0xd8),
            len @ 0..=0xff => {
                self.out.push(0xc7);
                self.out.push(len as u8);
            }
            len @ 0x100..=0xffff => {
                self.out.push(0xc8);
                self.out.extend_from_slice(&(len as u16).to_be_bytes());
            }
            len => {
                self.out.push(0xc9);
                self.out
                    .extend_from_slice(&u32::try_from(len).map_err(|_| {
                        CodecError::Unsupported {
                            what: "ext beyond 4 GiB",
                        }
                    })?
                    .to_be_bytes());
            }
        }
        self.out.push(code as u8);
        self.out.extend_from_slice(b);
        Ok(())
    }

    fn list_head(&mut self, len: u64) -> Result<()> {
        match len {
            0..=15 => self.out.push(0x90 | len as u8),
            16..=0xffff => {
                self.out.push(0xdc);
                self.out.extend_from_slice(&(len as u16).to_be_bytes());
            }
            _ => {
                self.out.push(0xdd);
                self.out.extend_from_slice(
                    &u32::try_from(len)
                        .map_err(|_| CodecError::Unsupported {
                            what: "list beyond 4 G entries",
                        })?
                        .to_be_bytes(),
                );
            }
        }
        Ok(())
    }

    fn map_head(&mut self, len: u64) -> Result<()> {
        match len {
            0..=15 => self.out.push(0x80 | len as u8),
            16..=0xffff => {
                self.out.push(0xde);
                self.out.extend_from_slice(&(len as u16).to_be_bytes());
            }
            _ => {
                self.out.push(0xdf);
                self.out.extend_from_slice(
                    &u32::try_from(len)
                        .map_err(|_| CodecError::Unsupported {
                            what: "map beyond 4 G entries",
                        })?
                        .to_be_bytes(),
                );
            }
        }
        Ok(())
    }
}
