//! Path grammar for addressing into a value tree.
//!
//! A path is a sequence of steps. Steps are separated by `.`, except
//! that a bracket step attaches directly to the step before it:
//! `a.b[0].c` has four steps. Each step is one of
//!
//!   - a bareword (`[A-Za-z_][A-Za-z0-9_]*`),
//!   - `["…"]` with JSON escape rules inside the quotes,
//!   - `[n]` with a non-negative decimal index,
//!   - a bare run of decimal digits, accepted as shorthand for the
//!     bracketed index form (`a.0.b` ≡ `a[0].b`).
//!
//! Barewords and quoted brackets are string keys and only ever select
//! on maps; indices only ever select on lists. A key step never
//! coerces to an index, so `["2"]` against a list is a miss on read
//! and rewrites the list into a map on write.

use smol_str::SmolStr;

use crate::error::NodeError;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A string key (bareword or quoted bracket step); selects on
    /// maps only
    Key(SmolStr),
    /// A list index (bracketed or bare decimal step); selects on
    /// lists only
    Index(usize),
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Key(k) if is_bareword(k) => write!(f, "{k}"),
            Step::Key(k) => {
                write!(f, "[\"")?;
                for c in k.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c if (c as u32) < 0x20 => write!(f, "\\u{:04x}", c as u32)?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"]")
            }
            Step::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A parsed path: zero or more steps. The empty path addresses the
/// node itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    /// Parse path text. Fails with [`NodeError::BadPath`] on any text
    /// that does not match the grammar.
    pub fn parse(text: &str) -> Result<Path, NodeError> {
        let bytes = text.as_bytes();
        let mut steps = Vec::new();
        let mut pos = 0usize;
        let bad = |offset: usize, reason: &'static str| NodeError::BadPath {
            path: text.to_string(),
            offset,
            reason,
        };
        if bytes.is_empty() {
            return Ok(Path { steps });
        }
        loop {
            match bytes.get(pos) {
                Some(b'[') => {
                    pos += 1;
                    match bytes.get(pos) {
                        Some(b'"') => {
                            let (key, next) = parse_quoted(text, pos)
                                .map_err(|(off, why)| bad(off, why))?;
                            pos = next;
                            if bytes.get(pos) != Some(&b']') {
                                return Err(bad(pos, "expected `]` after quoted key"));
                            }
                            pos += 1;
                            steps.push(Step::Key(key));
                        }
                        Some(b'0'..=b'9') => {
                            let start = pos;
                            while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                                pos += 1;
                            }
                            if bytes.get(pos) != Some(&b']') {
                                return Err(bad(pos, "expected `]` after index"));
                            }
                            let index: usize = text[start..pos]
                                .parse()
                                .map_err(|_| bad(start, "index out of range"))?;
                            pos += 1;
                            steps.push(Step::Index(index));
                        }
                        _ => return Err(bad(pos, "expected `\"` or digit after `[`")),
                    }
                }
                Some(b'A'..=b'Z' | b'a'..=b'z' | b'_') => {
                    let start = pos;
                    while matches!(
                        bytes.get(pos),
                        Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
                    ) {
                        pos += 1;
                    }
                    steps.push(Step::Key(SmolStr::new(&text[start..pos])));
                }
                Some(b'0'..=b'9') => {
                    let start = pos;
                    while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                        pos += 1;
                    }
                    let index: usize = text[start..pos]
                        .parse()
                        .map_err(|_| bad(start, "index out of range"))?;
                    steps.push(Step::Index(index));
                }
                _ => return Err(bad(pos, "expected a path step")),
            }
            match bytes.get(pos) {
                None => return Ok(Path { steps }),
                Some(b'.') => {
                    pos += 1;
                }
                // a bracket step follows the previous step directly
                Some(b'[') => {}
                _ => return Err(bad(pos, "expected `.`, `[` or end of path")),
            }
        }
    }

    /// Path over already-parsed steps
    pub fn from_steps(steps: Vec<Step>) -> Path {
        Path { steps }
    }

    /// The parsed steps in order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// True when the path addresses the node itself
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 && matches!(step, Step::Key(_)) {
                // bracket steps attach without a separator
                if matches!(step, Step::Key(k) if is_bareword(k)) {
                    write!(f, ".")?;
                }
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

fn is_bareword(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a JSON-escaped quoted string starting at the opening quote.
/// Returns the decoded key and the byte offset just past the closing
/// quote, or the offset and reason of the first error.
fn parse_quoted(text: &str, open: usize) -> Result<(SmolStr, usize), (usize, &'static str)> {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes[open], b'"');
    let mut out = String::new();
    let mut pos = open + 1;
    loop {
        let rest = &text[pos..];
        let c = rest
            .chars()
            .next()
            .ok_or((pos, "unterminated quoted key"))?;
        match c {
            '"' => return Ok((SmolStr::new(out), pos + 1)),
            '\\' => {
                let esc = text[pos + 1..]
                    .chars()
                    .next()
                    .ok_or((pos, "unterminated escape"))?;
                match esc {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'b' => out.push('\u{0008}'),
                    'f' => out.push('\u{000C}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'u' => {
                        let (c, consumed) = parse_unicode_escape(text, pos)?;
                        out.push(c);
                        pos += consumed;
                        continue;
                    }
                    _ => return Err((pos, "unknown escape")),
                }
                pos += 2;
            }
            c if (c as u32) < 0x20 => return Err((pos, "control character in quoted key")),
            c => {
                out.push(c);
                pos += c.len_utf8();
            }
        }
    }
}

/// Parse `\uXXXX` (possibly a surrogate pair) starting at the backslash.
/// Returns the decoded char and the number of bytes consumed.
fn parse_unicode_escape(text: &str, pos: usize) -> Result<(char, usize), (usize, &'static str)> {
    let hex4 = |at: usize| -> Result<u32, (usize, &'static str)> {
        let h = text
            .get(at..at + 4)
            .ok_or((at, "truncated unicode escape"))?;
        u32::from_str_radix(h, 16).map_err(|_| (at, "invalid unicode escape"))
    };
    let first = hex4(pos + 2)?;
    if (0xD800..0xDC00).contains(&first) {
        // high surrogate, require a low surrogate escape next
        if text.as_bytes().get(pos + 6) == Some(&b'\\') && text.as_bytes().get(pos + 7) == Some(&b'u')
        {
            let second = hex4(pos + 8)?;
            if (0xDC00..0xE000).contains(&second) {
                let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
                let c = char::from_u32(combined).ok_or((pos, "invalid surrogate pair"))?;
                return Ok((c, 12));
            }
        }
        Err((pos, "lone surrogate"))
    } else if (0xDC00..0xE000).contains(&first) {
        Err((pos, "lone surrogate"))
    } else {
        let c = char::from_u32(first).ok_or((pos, "invalid unicode escape"))?;
        Ok((c, 6))
    }
}
