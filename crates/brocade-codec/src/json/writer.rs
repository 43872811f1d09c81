//! JSON writer.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;

use brocade_node::{Event, Node, Scalar, Value, node::format_float};

use crate::error::{CodecError, Result};
use crate::json::JsonWriteOptions;

/// Push-style JSON writer producing UTF-8 text.
///
/// Tags are dropped in plain JSON and rendered as `tag(value)` in
/// diagnostic mode. Buffers become base64 strings (padding kept) in
/// plain JSON and `h'…'` literals in diagnostic mode.
pub struct JsonWriter {
    out: String,
    opts: JsonWriteOptions,
    /// Event-mode bookkeeping: (is_map, items_written)
    frames: Vec<(bool, usize)>,
    key_pending: bool,
}

impl JsonWriter {
    /// Fresh writer
    pub fn new(opts: JsonWriteOptions) -> JsonWriter {
        JsonWriter {
            out: String::new(),
            opts,
            frames: Vec::new(),
            key_pending: false,
        }
    }

    /// The rendered document
    pub fn into_string(self) -> String {
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
        let diag_tag = self.opts.cbor_diag && tag.is_some();
        if diag_tag {
            self.out.push_str(&tag.expect("checked").to_string());
            self.out.push('(');
        }
        node.with_value(|value| -> Result<()> {
            match value {
                Value::Null => self.out.push_str("null"),
                Value::Undefined(Some(code)) if self.opts.cbor_diag => {
                    self.out.push_str(&format!("simple({code})"));
                }
                Value::Undefined(None) if self.opts.cbor_diag => self.out.push_str("undefined"),
                Value::Undefined(_) => self.out.push_str("null"),
                Value::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
                Value::Int(v) => self.out.push_str(&v.to_string()),
                Value::Long(v) => self.out.push_str(&v.to_string()),
                Value::Big(b) => self.out.push_str(&b.to_string()),
                Value::Float(f) => self.float(*f)?,
                Value::String(s) => self.string(s)?,
                Value::Buffer(b) => {
                    if self.opts.cbor_diag {
                        self.out.push_str("h'");
                        for byte in b.iter() {
                            self.out.push_str(&format!("{byte:02x}"));
                        }
                        self.out.push('\'');
                    } else {
                        self.string(&BASE64_STANDARD.encode(b))?;
                    }
                }
                Value::List(_) => {
                    let items = node.items().expect("list");
                    self.out.push('[');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        self.newline_indent(depth + 1);
                        self.node(item, depth + 1)?;
                    }
                    if !items.is_empty() {
                        self.newline_indent(depth);
                    }
                    self.out.push(']');
                }
                Value::Map(_) => {
                    let mut entries = node.entries().expect("map");
                    if self.opts.sorted {
                        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                    }
                    self.out.push('{');
                    for (i, (key, child)) in entries.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        self.newline_indent(depth + 1);
                        self.string(key)?;
                        self.out.push(':');
                        if self.opts.pretty {
                            self.out.push(' ');
                        }
                        self.node(child, depth + 1)?;
                    }
                    if !entries.is_empty() {
                        self.newline_indent(depth);
                    }
                    self.out.push('}');
                }
            }
            Ok(())
        })?;
        if diag_tag {
            self.out.push(')');
        }
        Ok(())
    }

    /// Encode one raw event, maintaining separators and indentation
    pub fn event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::StartMap | Event::StartList => {
                self.separate();
                self.frames.push((matches!(event, Event::StartMap), 0));
                self.out
                    .push(if matches!(event, Event::StartMap) { '{' } else { '[' });
            }
            Event::EndMap | Event::EndList => {
                let (is_map, count) = self
                    .frames
                    .pop()
                    .ok_or(CodecError::Unsupported { what: "unbalanced close event" })?;
                if count > 0 {
                    self.newline_indent(self.frames.len());
                }
                self.out.push(if is_map { '}' } else { ']' });
                self.bump();
            }
            Event::Key(k) => {
                self.separate();
                self.string(k)?;
                self.out.push(':');
                if self.opts.pretty {
                    self.out.push(' ');
                }
                self.key_pending = true;
            }
            Event::Tag(_) => {
                // tags have no JSON shape; diagnostic output of raw
                // event streams keeps the value only
            }
            Event::Simple(code) => {
                self.separate();
                if self.opts.cbor_diag {
                    self.out.push_str(&format!("simple({code})"));
                } else {
                    self.out.push_str("null");
                }
                self.bump();
            }
            Event::Primitive(s) => {
                self.separate();
                self.scalar(s)?;
                self.bump();
            }
        }
        Ok(())
    }

    fn scalar(&mut self, s: &Scalar) -> Result<()> {
        match s {
            Scalar::Null => self.out.push_str("null"),
            Scalar::Undefined => self
                .out
                .push_str(if self.opts.cbor_diag { "undefined" } else { "null" }),
            Scalar::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Scalar::Int(v) => self.out.push_str(&v.to_string()),
            Scalar::Long(v) => self.out.push_str(&v.to_string()),
            Scalar::Big(b) => self.out.push_str(&b.to_string()),
            Scalar::Float(f) => self.float(*f)?,
            Scalar::Str(v) => self.string(v)?,
            Scalar::Bytes(b) => {
                if self.opts.cbor_diag {
                    self.out.push_str("h'");
                    for byte in b.iter() {
                        self.out.push_str(&format!("{byte:02x}"));
                    }
                    self.out.push('\'');
                } else {
                    self.string(&BASE64_STANDARD.encode(b))?;
                }
            }
        }
        Ok(())
    }

    /// Comma/indent before an item in event mode
    fn separate(&mut self) {
        if self.key_pending {
            self.key_pending = false;
            return;
        }
        if let Some((_, count)) = self.frames.last() {
            if *count > 0 {
                self.out.push(',');
            }
            self.newline_indent(self.frames.len());
        }
    }

    /// Count a completed item in event mode
    fn bump(&mut self) {
        if let Some((_, count)) = self.frames.last_mut() {
            *count += 1;
        }
    }

    fn float(&mut self, f: f64) -> Result<()> {
        if f.is_finite() {
            self.out.push_str(&format_float(f));
            return Ok(());
        }
        if self.opts.cbor_diag {
            self.out.push_str(if f.is_nan() {
                "NaN"
            } else if f > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            });
            return Ok(());
        }
        if self.opts.allow_nan {
            self.out.push_str("null");
            return Ok(());
        }
        Err(CodecError::NumericNonFinite)
    }

    fn string(&mut self, s: &str) -> Result<()> {
        if s.len() > self.opts.max_string_length {
            return Err(CodecError::ResourceLimit {
                limit: "string length",
            });
        }
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                '\u{0008}' => self.out.push_str("\\b"),
                '\u{000C}' => self.out.push_str("\\f"),
                c if (c as u32) < 0x20 => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
        Ok(())
    }

    fn newline_indent(&mut self, depth: usize) {
        if !self.opts.pretty {
            return;
        }
        self.out.push('\n');
        for _ in 0..depth {
            let unit = self.opts.indent.clone();
            self.out.push_str(&unit);
        }
    }
}
