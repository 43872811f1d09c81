//! Pull parser for JSON text.

use bytes::Bytes;
use num_bigint::BigInt;
use smol_str::SmolStr;

use brocade_node::{Event, Node, NodeBuilder, Scalar};

use crate::error::{CodecError, Location, Result};
use crate::input::Input;
use crate::json::JsonReadOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Unknown,
    Utf8,
    Utf16Be,
    Utf16Le,
    Utf32Be,
    Utf32Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Map,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    /// Directly after the opening bracket
    First,
    /// A key (maps) or value (lists) is due
    Item,
    /// A map value is due after its key
    Value,
    /// A separator or the closing bracket is due
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    state: FrameState,
}

/// Cursor snapshot for event-atomic rewind
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    column: u32,
}

/// Streaming JSON reader emitting the shared event stream
pub struct JsonReader {
    input: Input,
    opts: JsonReadOptions,
    encoding: Encoding,
    stack: Vec<Frame>,
    line: u32,
    column: u32,
    done: bool,
}

impl JsonReader {
    /// Reader over an initial byte chunk
    pub fn new(bytes: &[u8], opts: JsonReadOptions) -> JsonReader {
        let mut input = Input::new(bytes, opts.partial);
        input.set_budget(opts.byte_budget);
        JsonReader {
            input,
            opts,
            encoding: Encoding::Unknown,
            stack: Vec::new(),
            line: 1,
            column: 1,
            done: false,
        }
    }

    /// Feed more bytes to a partial reader
    pub fn push_input(&mut self, bytes: &[u8]) -> Result<()> {
        self.input.push(bytes)
    }

    /// Declare the input complete, letting a trailing number finish
    pub fn end_input(&mut self) {
        self.input.end();
    }

    /// True once the document's root value has fully closed
    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Bytes of input consumed so far
    pub fn consumed(&self) -> usize {
        self.input.pos()
    }

    /// Error unless only trivia remains
    pub(crate) fn expect_end(&mut self) -> Result<()> {
        self.skip_trivia()?;
        if self.peek_char()?.is_some() {
            return Err(self.syntax("trailing characters after document"));
        }
        Ok(())
    }

    fn location(&self) -> Location {
        Location {
            offset: self.input.pos(),
            line: self.line,
            column: self.column,
        }
    }

    fn syntax(&self, message: impl Into<String>) -> CodecError {
        CodecError::syntax(message, self.location())
    }

    fn underrun(&self) -> CodecError {
        CodecError::UnexpectedEnd {
            location: self.location(),
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.input.pos(),
            line: self.line,
            column: self.column,
        }
    }

    fn rewind(&mut self, mark: Mark) {
        self.input.rewind(mark.pos);
        self.line = mark.line;
        self.column = mark.column;
    }

    /// Next event, or `Ok(None)` when a partial input has run dry
    /// between events
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        self.input.check_budget()?;
        if self.done {
            return Ok(None);
        }
        let mark = self.mark();
        match self.decode_event() {
            Ok(ev) => {
                if self.stack.is_empty() {
                    self.done = true;
                }
                Ok(Some(ev))
            }
            Err(e) if e.is_underrun() && self.input.can_resume() => {
                tracing::trace!(offset = mark.pos, "json reader suspended awaiting input");
                self.rewind(mark);
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
        Err(self.underrun())
    }

    fn decode_event(&mut self) -> Result<Event> {
        loop {
            self.skip_trivia()?;
            let Some(frame) = self.stack.last().copied() else {
                return self.parse_value();
            };
            match (frame.kind, frame.state) {
                (FrameKind::Map, FrameState::First | FrameState::Item) => {
                    if self.peek_char()? == Some('}')
                        && (frame.state == FrameState::First || self.opts.allow_trailing_comma)
                    {
                        self.next_char()?;
                        self.stack.pop();
                        return Ok(Event::EndMap);
                    }
                    let key = self.parse_key()?;
                    self.skip_trivia()?;
                    match self.next_char()? {
                        ':' => {}
                        _ => return Err(self.syntax("expected `:` after object key")),
                    }
                    self.top_state(FrameState::Value);
                    return Ok(Event::Key(key));
                }
                (FrameKind::Map, FrameState::Value) => {
                    self.top_state(FrameState::CommaOrEnd);
                    return self.parse_value();
                }
                (FrameKind::List, FrameState::Value) => unreachable!("lists have no key slot"),
                (FrameKind::List, FrameState::First | FrameState::Item) => {
                    if self.peek_char()? == Some(']')
                        && (frame.state == FrameState::First || self.opts.allow_trailing_comma)
                    {
                        self.next_char()?;
                        self.stack.pop();
                        return Ok(Event::EndList);
                    }
                    self.top_state(FrameState::CommaOrEnd);
                    return self.parse_value();
                }
                (kind, FrameState::CommaOrEnd) => {
                    let close = if kind == FrameKind::Map { '}' } else { ']' };
                    match self.next_char()? {
                        ',' => {
                            self.top_state(FrameState::Item);
                            // fall through to parse the next item
                        }
                        c if c == close => {
                            self.stack.pop();
                            return Ok(if kind == FrameKind::Map {
                                Event::EndMap
                            } else {
                                Event::EndList
                            });
                        }
                        _ => return Err(self.syntax("expected `,` or closing bracket")),
                    }
                }
            }
        }
    }

    fn top_state(&mut self, state: FrameState) {
        if let Some(f) = self.stack.last_mut() {
            f.state = state;
        }
    }

    /// A value event. For `{` and `[` this pushes a frame; everything
    /// else is one primitive. The enclosing frame's state was already
    /// advanced, except that for maps the colon/value handling is in
    /// `decode_event`.
    fn parse_value(&mut self) -> Result<Event> {
        let Some(c) = self.peek_char()? else {
            return Err(self.underrun());
        };
        match c {
            '{' => {
                self.next_char()?;
                self.push_frame(FrameKind::Map)?;
                Ok(Event::StartMap)
            }
            '[' => {
                self.next_char()?;
                self.push_frame(FrameKind::List)?;
                Ok(Event::StartList)
            }
            '"' => Ok(Event::Primitive(Scalar::Str(self.parse_string()?))),
            '-' | '0'..='9' => self.parse_number(),
            'h' if self.opts.cbor_diag => Ok(Event::Primitive(self.parse_hex_literal()?)),
            _ if c.is_ascii_alphabetic() => self.parse_literal(),
            _ => Err(self.syntax(format!("unexpected character `{c}`"))),
        }
    }

    fn push_frame(&mut self, kind: FrameKind) -> Result<()> {
        if self.stack.len() >= self.opts.max_recursion {
            return Err(CodecError::ResourceLimit { limit: "recursion" });
        }
        self.stack.push(Frame {
            kind,
            state: FrameState::First,
        });
        Ok(())
    }

    fn parse_key(&mut self) -> Result<SmolStr> {
        match self.peek_char()? {
            Some('"') => Ok(SmolStr::new(self.parse_string()?)),
            Some(c) if self.opts.allow_unquoted_key && (c.is_ascii_alphabetic() || c == '_') => {
                let mut key = String::new();
                while let Some(c) = self.peek_char()? {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                        key.push(self.next_char()?);
                    } else {
                        break;
                    }
                }
                Ok(SmolStr::new(key))
            }
            Some(_) => Err(self.syntax("expected object key")),
            None => Err(self.underrun()),
        }
    }

    /// `true`, `false`, `null` and the diagnostic keywords
    fn parse_literal(&mut self) -> Result<Event> {
        let mut word = String::new();
        while let Some(c) = self.peek_char()? {
            if c.is_ascii_alphabetic() {
                word.push(self.next_char()?);
            } else {
                break;
            }
        }
        match word.as_str() {
            "true" => Ok(Event::Primitive(Scalar::Bool(true))),
            "false" => Ok(Event::Primitive(Scalar::Bool(false))),
            "null" => Ok(Event::Primitive(Scalar::Null)),
            "undefined" if self.opts.cbor_diag => Ok(Event::Primitive(Scalar::Undefined)),
            "NaN" if self.opts.cbor_diag => Ok(Event::Primitive(Scalar::Float(f64::NAN))),
            "Infinity" if self.opts.cbor_diag => {
                Ok(Event::Primitive(Scalar::Float(f64::INFINITY)))
            }
            "simple" if self.opts.cbor_diag => {
                if self.next_char()? != '(' {
                    return Err(self.syntax("expected `(` after simple"));
                }
                let mut digits = String::new();
                while let Some(c) = self.peek_char()? {
                    if c.is_ascii_digit() {
                        digits.push(self.next_char()?);
                    } else {
                        break;
                    }
                }
                if self.next_char()? != ')' {
                    return Err(self.syntax("expected `)` after simple value"));
                }
                let code: u8 = digits
                    .parse()
                    .map_err(|_| self.syntax("simple value out of range"))?;
                Ok(Event::Simple(code))
            }
            _ => Err(self.syntax(format!("unknown literal `{word}`"))),
        }
    }

    /// `h'68656c6c6f'` byte-string literal from diagnostic notation
    fn parse_hex_literal(&mut self) -> Result<Scalar> {
        self.next_char()?; // h
        if self.next_char()? != '\'' {
            return Err(self.syntax("expected `'` after h"));
        }
        let mut digits = String::new();
        loop {
            match self.next_char()? {
                '\'' => break,
                c if c.is_ascii_hexdigit() => digits.push(c),
                _ => return Err(self.syntax("invalid hex digit in byte literal")),
            }
        }
        if digits.len() % 2 != 0 {
            return Err(self.syntax("odd number of hex digits in byte literal"));
        }
        if digits.len() / 2 > self.opts.max_string_length {
            return Err(CodecError::ResourceLimit {
                limit: "string length",
            });
        }
        let bytes: Vec<u8> = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).expect("hex digits"))
            .collect();
        Ok(Scalar::Bytes(Bytes::from(bytes)))
    }

    /// Numbers parse into the narrowest variant that keeps the value;
    /// a fraction or exponent always yields the float variant.
    fn parse_number(&mut self) -> Result<Event> {
        let mut text = String::new();
        if self.peek_char()? == Some('-') {
            text.push(self.next_char()?);
            if self.opts.cbor_diag && self.peek_char()? == Some('I') {
                let mut word = String::new();
                while let Some(c) = self.peek_char()? {
                    if c.is_ascii_alphabetic() {
                        word.push(self.next_char()?);
                    } else {
                        break;
                    }
                }
                if word == "Infinity" {
                    return Ok(Event::Primitive(Scalar::Float(f64::NEG_INFINITY)));
                }
                return Err(self.syntax(format!("unknown literal `-{word}`")));
            }
        }
        let mut integral = true;
        // integer part
        match self.peek_char()? {
            Some('0') => {
                text.push(self.next_char()?);
                if let Some(c) = self.peek_char()?
                    && c.is_ascii_digit()
                {
                    return Err(self.syntax("leading zero in number"));
                }
            }
            Some(c) if c.is_ascii_digit() => {
                while let Some(c) = self.peek_char()? {
                    if c.is_ascii_digit() {
                        text.push(self.next_char()?);
                    } else {
                        break;
                    }
                }
            }
            _ => return Err(self.syntax("expected digit")),
        }
        // fraction
        if self.peek_char()? == Some('.') {
            integral = false;
            text.push(self.next_char()?);
            let mut any = false;
            while let Some(c) = self.peek_char()? {
                if c.is_ascii_digit() {
                    text.push(self.next_char()?);
                    any = true;
                } else {
                    break;
                }
            }
            if !any {
                return Err(self.syntax("expected digit after decimal point"));
            }
        }
        // exponent
        if matches!(self.peek_char()?, Some('e' | 'E')) {
            integral = false;
            text.push(self.next_char()?);
            if matches!(self.peek_char()?, Some('+' | '-')) {
                text.push(self.next_char()?);
            }
            let mut any = false;
            while let Some(c) = self.peek_char()? {
                if c.is_ascii_digit() {
                    text.push(self.next_char()?);
                    any = true;
                } else {
                    break;
                }
            }
            if !any {
                return Err(self.syntax("expected digit in exponent"));
            }
        }
        let scalar = if integral {
            if let Ok(v) = text.parse::<i32>() {
                Scalar::Int(v)
            } else if let Ok(v) = text.parse::<i64>() {
                Scalar::Long(v)
            } else {
                let big = BigInt::parse_bytes(text.as_bytes(), 10)
                    .ok_or_else(|| self.syntax("unparseable integer"))?;
                Scalar::Big(big)
            }
        } else {
            let v: f64 = text
                .parse()
                .map_err(|_| self.syntax("unparseable number"))?;
            Scalar::Float(v)
        };
        Ok(Event::Primitive(scalar))
    }

    fn parse_string(&mut self) -> Result<String> {
        self.next_char()?; // opening quote
        let mut out = String::new();
        loop {
            if out.len() > self.opts.max_string_length {
                return Err(CodecError::ResourceLimit {
                    limit: "string length",
                });
            }
            let c = self.require_char()?;
            match c {
                '"' => return Ok(out),
                '\\' => out.push(self.parse_escape()?),
                c if (c as u32) < 0x20 => {
                    return Err(self.syntax("control character in string"));
                }
                c => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self) -> Result<char> {
        let c = self.require_char()?;
        Ok(match c {
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{0008}',
            'f' => '\u{000C}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                let first = self.hex4()?;
                if (0xD800..0xDC00).contains(&first) {
                    // surrogate pair required
                    if self.require_char()? != '\\' || self.require_char()? != 'u' {
                        return Err(self.syntax("lone surrogate in string"));
                    }
                    let second = self.hex4()?;
                    if !(0xDC00..0xE000).contains(&second) {
                        return Err(self.syntax("lone surrogate in string"));
                    }
                    let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
                    char::from_u32(combined)
                        .ok_or_else(|| self.syntax("invalid surrogate pair"))?
                } else if (0xDC00..0xE000).contains(&first) {
                    return Err(self.syntax("lone surrogate in string"));
                } else {
                    char::from_u32(first)
                        .ok_or_else(|| self.syntax("invalid unicode escape"))?
                }
            }
            _ => return Err(self.syntax("unknown escape")),
        })
    }

    fn hex4(&mut self) -> Result<u32> {
        let mut v = 0u32;
        for _ in 0..4 {
            let c = self.require_char()?;
            let d = c
                .to_digit(16)
                .ok_or_else(|| self.syntax("invalid unicode escape"))?;
            v = (v << 4) | d;
        }
        Ok(v)
    }

    /// Skip whitespace and (when allowed) comments
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek_char()? {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.next_char()?;
                }
                Some('/') if self.opts.allow_comments => {
                    let mark = self.mark();
                    self.next_char()?;
                    match self.peek_char()? {
                        Some('/') => {
                            while let Some(c) = self.peek_char()? {
                                if c == '\n' {
                                    break;
                                }
                                self.next_char()?;
                            }
                        }
                        Some('*') => {
                            self.next_char()?;
                            let mut star = false;
                            loop {
                                let c = self.require_char()?;
                                if star && c == '/' {
                                    break;
                                }
                                star = c == '*';
                            }
                        }
                        _ => {
                            self.rewind(mark);
                            return Ok(());
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Next char or an underrun/end error
    fn require_char(&mut self) -> Result<char> {
        match self.peek_char()? {
            Some(_) => self.next_char(),
            None => Err(self.underrun()),
        }
    }

    fn next_char(&mut self) -> Result<char> {
        let c = match self.peek_char()? {
            Some(c) => c,
            None => return Err(self.underrun()),
        };
        let width = self.char_width(c);
        for _ in 0..width {
            self.input.take();
        }
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Ok(c)
    }

    fn char_width(&self, c: char) -> usize {
        match self.encoding {
            Encoding::Utf8 => c.len_utf8(),
            Encoding::Utf16Be | Encoding::Utf16Le => c.len_utf16() * 2,
            Encoding::Utf32Be | Encoding::Utf32Le => 4,
            Encoding::Unknown => unreachable!("encoding detected before reads"),
        }
    }

    /// Decode the character at the cursor without consuming it.
    /// `Ok(None)` means true end of input; an underrun error means a
    /// resumable shortage.
    fn peek_char(&mut self) -> Result<Option<char>> {
        if self.encoding == Encoding::Unknown {
            self.detect_encoding()?;
        }
        let remaining = self.input.remaining();
        if remaining == 0 {
            if self.input.can_resume() {
                return Err(self.underrun());
            }
            return Ok(None);
        }
        match self.encoding {
            Encoding::Utf8 => {
                let b0 = self.input.peek().expect("checked");
                let width = match b0 {
                    0x00..=0x7f => 1,
                    0xc2..=0xdf => 2,
                    0xe0..=0xef => 3,
                    0xf0..=0xf4 => 4,
                    _ => return Err(self.syntax("invalid UTF-8")),
                };
                if remaining < width {
                    if self.input.can_resume() {
                        return Err(self.underrun());
                    }
                    return Err(self.syntax("truncated UTF-8 sequence"));
                }
                let mut buf = [0u8; 4];
                for i in 0..width {
                    buf[i] = self.input.peek_at(i).expect("checked");
                }
                match std::str::from_utf8(&buf[..width]) {
                    Ok(s) => Ok(s.chars().next()),
                    Err(_) => Err(self.syntax("invalid UTF-8")),
                }
            }
            Encoding::Utf16Be | Encoding::Utf16Le => {
                let unit = |this: &Self, at: usize| -> Option<u16> {
                    let hi = this.input.peek_at(at)?;
                    let lo = this.input.peek_at(at + 1)?;
                    Some(if this.encoding == Encoding::Utf16Be {
                        u16::from_be_bytes([hi, lo])
                    } else {
                        u16::from_le_bytes([hi, lo])
                    })
                };
                let Some(first) = unit(self, 0) else {
                    return if self.input.can_resume() {
                        Err(self.underrun())
                    } else {
                        Err(self.syntax("truncated UTF-16 unit"))
                    };
                };
                if (0xD800..0xDC00).contains(&first) {
                    let Some(second) = unit(self, 2) else {
                        return if self.input.can_resume() {
                            Err(self.underrun())
                        } else {
                            Err(self.syntax("lone surrogate in UTF-16 input"))
                        };
                    };
                    if !(0xDC00..0xE000).contains(&second) {
                        return Err(self.syntax("lone surrogate in UTF-16 input"));
                    }
                    let c = 0x10000u32
                        + (((first as u32) - 0xD800) << 10)
                        + ((second as u32) - 0xDC00);
                    Ok(char::from_u32(c))
                } else if (0xDC00..0xE000).contains(&first) {
                    Err(self.syntax("lone surrogate in UTF-16 input"))
                } else {
                    Ok(char::from_u32(first as u32))
                }
            }
            Encoding::Utf32Be | Encoding::Utf32Le => {
                if remaining < 4 {
                    return if self.input.can_resume() {
                        Err(self.underrun())
                    } else {
                        Err(self.syntax("truncated UTF-32 unit"))
                    };
                }
                let mut raw = [0u8; 4];
                for (i, slot) in raw.iter_mut().enumerate() {
                    *slot = self.input.peek_at(i).expect("checked");
                }
                let v = if self.encoding == Encoding::Utf32Be {
                    u32::from_be_bytes(raw)
                } else {
                    u32::from_le_bytes(raw)
                };
                char::from_u32(v)
                    .map(Some)
                    .ok_or_else(|| self.syntax("invalid UTF-32 scalar"))
            }
            Encoding::Unknown => unreachable!(),
        }
    }

    /// RFC 4627 §3: byte-order mark first, then the null-byte pattern
    /// of the first four bytes.
    fn detect_encoding(&mut self) -> Result<()> {
        let have = self.input.remaining();
        if have < 4 && self.input.can_resume() {
            return Err(self.underrun());
        }
        let b = self.input.as_slice();
        let at = |i: usize| b.get(self.input.pos() + i).copied();
        let (encoding, bom) = match (at(0), at(1), at(2), at(3)) {
            (Some(0xef), Some(0xbb), Some(0xbf), _) => (Encoding::Utf8, 3),
            (Some(0x00), Some(0x00), Some(0xfe), Some(0xff)) => (Encoding::Utf32Be, 4),
            (Some(0xff), Some(0xfe), Some(0x00), Some(0x00)) => (Encoding::Utf32Le, 4),
            (Some(0xfe), Some(0xff), _, _) => (Encoding::Utf16Be, 2),
            (Some(0xff), Some(0xfe), _, _) => (Encoding::Utf16Le, 2),
            (Some(0x00), Some(0x00), Some(0x00), Some(_)) => (Encoding::Utf32Be, 0),
            (Some(_), Some(0x00), Some(0x00), Some(0x00)) => (Encoding::Utf32Le, 0),
            (Some(0x00), Some(_), Some(0x00), Some(_)) => (Encoding::Utf16Be, 0),
            (Some(_), Some(0x00), Some(_), Some(0x00)) => (Encoding::Utf16Le, 0),
            (Some(0x00), Some(_), _, _) => (Encoding::Utf16Be, 0),
            (Some(_), Some(0x00), _, _) => (Encoding::Utf16Le, 0),
            _ => (Encoding::Utf8, 0),
        };
        self.encoding = encoding;
        for _ in 0..bom {
            self.input.take();
        }
        Ok(())
    }
}
