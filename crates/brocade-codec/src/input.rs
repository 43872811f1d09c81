//! Byte input shared by the three readers.
//!
//! The buffer keeps everything it has been fed; readers snapshot the
//! cursor before decoding an event and rewind on underrun, so a
//! partial reader resumes exactly between complete events (spec:
//! suspension points are event boundaries).

use crate::error::{CodecError, Location, Result};

/// Growable input buffer with a cursor and an optional byte budget
#[derive(Debug, Default)]
pub struct Input {
    buf: Vec<u8>,
    pos: usize,
    partial: bool,
    ended: bool,
    budget: Option<usize>,
    exceeded: bool,
}

impl Input {
    /// New input over an initial byte chunk. A `partial` input may be
    /// fed more bytes later; a non-partial input is complete as given.
    pub fn new(bytes: &[u8], partial: bool) -> Input {
        Input {
            buf: bytes.to_vec(),
            pos: 0,
            partial,
            ended: !partial,
            budget: None,
            exceeded: false,
        }
    }

    /// Cap the total number of bytes this input will accept. An
    /// already-overlarge buffer surfaces on the next
    /// [`Input::check_budget`].
    pub fn set_budget(&mut self, budget: Option<usize>) {
        self.budget = budget;
        if let Some(b) = budget
            && self.buf.len() > b
        {
            self.exceeded = true;
        }
    }

    /// Fails once the budget has been exceeded
    pub fn check_budget(&self) -> Result<()> {
        if self.exceeded {
            return Err(CodecError::ResourceLimit {
                limit: "byte budget",
            });
        }
        Ok(())
    }

    /// Append more input. Only meaningful on a partial input that has
    /// not been ended.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if self.ended {
            return Err(CodecError::Unsupported {
                what: "input after end of stream",
            });
        }
        if let Some(b) = self.budget
            && self.buf.len() + bytes.len() > b
        {
            return Err(CodecError::ResourceLimit {
                limit: "byte budget",
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Declare that no more input will arrive
    pub fn end(&mut self) {
        self.ended = true;
    }

    /// True when underrun should be reported as resumable
    pub fn can_resume(&self) -> bool {
        self.partial && !self.ended
    }

    /// Current cursor (byte offset)
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Rewind to a snapshot taken with [`Input::pos`]
    pub fn rewind(&mut self, pos: usize) {
        debug_assert!(pos <= self.pos);
        self.pos = pos;
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whole buffer (for encoding sniffing)
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Next byte without consuming it
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Byte at `pos + ahead`
    pub fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.buf.get(self.pos + ahead).copied()
    }

    /// Consume one byte
    pub fn take(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Consume exactly `n` bytes
    pub fn take_n(&mut self, n: usize) -> Option<&[u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    /// Underrun error for the current position
    pub fn underrun(&self) -> CodecError {
        CodecError::UnexpectedEnd {
            location: Location {
                offset: self.pos,
                line: 0,
                column: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_and_rewind() {
        let mut input = Input::new(&[1, 2, 3], false);
        let mark = input.pos();
        assert_eq!(input.take(), Some(1));
        assert_eq!(input.take_n(2).unwrap(), &[2, 3]);
        assert_eq!(input.take(), None);
        input.rewind(mark);
        assert_eq!(input.remaining(), 3);
    }

    #[test]
    fn push_respects_budget() {
        let mut input = Input::new(&[0; 4], true);
        input.set_budget(Some(6));
        input.check_budget().expect("within budget");
        input.push(&[0; 2]).expect("within budget");
        assert!(matches!(
            input.push(&[0]).unwrap_err(),
            CodecError::ResourceLimit { .. }
        ));
        let mut input = Input::new(&[0; 8], false);
        input.set_budget(Some(6));
        assert!(input.check_budget().is_err());
    }

    #[test]
    fn ended_input_rejects_pushes() {
        let mut input = Input::new(&[], true);
        assert!(input.can_resume());
        input.end();
        assert!(!input.can_resume());
        assert!(input.push(&[1]).is_err());
    }
}
