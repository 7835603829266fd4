//! Caller-owned input and output windows.
//!
//! A [`StreamDecoder`](crate::StreamDecoder) never owns the bytes it reads
//! or the space it writes to. Each call borrows an [`InputCursor`] and an
//! [`OutputCursor`], advances them, and gives them back; the positions tell
//! the caller how much was consumed and produced.

/// Read position within a caller-owned input slice.
///
/// # Example
///
/// ```rust
/// use xzstream::InputCursor;
///
/// let data = [1u8, 2, 3, 4];
/// let mut input = InputCursor::new(&data);
/// input.advance(3);
/// assert_eq!(input.remaining(), &[4]);
/// assert_eq!(input.position(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct InputCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> InputCursor<'a> {
    /// Wraps an input slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the unconsumed bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Returns the number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` if every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Returns the number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Marks `n` bytes as consumed.
    ///
    /// Clamped to the end of the slice.
    pub fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.buf.len());
    }

    /// Consumes and returns the next byte.
    pub(crate) fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    /// Consumes up to `max` bytes and returns them.
    pub(crate) fn take(&mut self, max: usize) -> &'a [u8] {
        let n = max.min(self.len());
        let start = self.pos;
        self.pos += n;
        &self.buf[start..start + n]
    }
}

/// Write position within a caller-owned output slice.
///
/// The decoder only writes into [`unfilled`](Self::unfilled). Bytes that
/// were already written when a call started are never touched again.
///
/// # Example
///
/// ```rust
/// use xzstream::OutputCursor;
///
/// let mut buf = [0u8; 4];
/// let mut output = OutputCursor::new(&mut buf);
/// output.unfilled()[..2].copy_from_slice(b"xz");
/// output.advance(2);
/// assert_eq!(output.filled(), b"xz");
/// assert_eq!(output.available(), 2);
/// ```
#[derive(Debug)]
pub struct OutputCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> OutputCursor<'a> {
    /// Wraps an output slice.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Wraps a slice whose first `pos` bytes are already written.
    pub(crate) fn with_position(buf: &'a mut [u8], pos: usize) -> Self {
        let pos = pos.min(buf.len());
        Self { buf, pos }
    }

    /// Returns the bytes written so far.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Returns the space not yet written.
    pub fn unfilled(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }

    /// Returns the number of bytes that can still be written.
    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` if no space is left.
    pub fn is_full(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Returns the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Marks `n` bytes of [`unfilled`](Self::unfilled) as written.
    ///
    /// Clamped to the end of the slice.
    pub fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.buf.len());
    }

    /// Copies as much of `data` as fits and returns the number of bytes copied.
    pub(crate) fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.available());
        self.buf[self.pos..self.pos + n].copy_from_slice(&data[..n]);
        self.pos += n;
        n
    }

    /// Moves the position back by `n` bytes written during the current call.
    ///
    /// Filters use this to hand back bytes they could not convert yet.
    pub(crate) fn rewind(&mut self, n: usize) {
        debug_assert!(n <= self.pos);
        self.pos -= n.min(self.pos);
    }

    /// Splits into the bytes already written and the space still free.
    pub(crate) fn split(&mut self) -> (&mut [u8], &mut [u8]) {
        self.buf.split_at_mut(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_take_and_read() {
        let data = b"abcdef";
        let mut input = InputCursor::new(data);

        assert_eq!(input.read_byte(), Some(b'a'));
        assert_eq!(input.take(3), b"bcd");
        assert_eq!(input.take(10), b"ef");
        assert!(input.is_empty());
        assert_eq!(input.read_byte(), None);
        assert_eq!(input.position(), 6);
    }

    #[test]
    fn test_input_advance_clamped() {
        let data = [0u8; 4];
        let mut input = InputCursor::new(&data);
        input.advance(usize::MAX);
        assert_eq!(input.len(), 0);
        assert_eq!(input.position(), 4);
    }

    #[test]
    fn test_output_write_partial() {
        let mut buf = [0u8; 3];
        let mut output = OutputCursor::new(&mut buf);

        assert_eq!(output.write(b"ab"), 2);
        assert_eq!(output.write(b"cde"), 1);
        assert!(output.is_full());
        assert_eq!(output.write(b"f"), 0);
        assert_eq!(output.filled(), b"abc");
    }

    #[test]
    fn test_output_split() {
        let mut buf = [0u8; 5];
        let mut output = OutputCursor::new(&mut buf);
        output.write(b"xy");

        let (filled, unfilled) = output.split();
        assert_eq!(filled, b"xy");
        assert_eq!(unfilled.len(), 3);
    }

    #[test]
    fn test_output_rewind_and_resume() {
        let mut buf = [0u8; 6];
        let mut output = OutputCursor::with_position(&mut buf, 2);
        assert_eq!(output.available(), 4);

        output.write(b"abc");
        output.rewind(2);
        assert_eq!(output.position(), 3);
        assert_eq!(output.available(), 3);
    }
}
