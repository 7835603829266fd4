//! Sliding dictionary for the LZMA2 decoder.
//!
//! The dictionary is a circular buffer holding the most recent output.
//! Decoded bytes are written into it first and copied out to the caller
//! by [`Dictionary::flush`]; `limit` keeps the amount written between two
//! flushes within the space the caller has available.

use crate::streaming::{InputCursor, OutputCursor};
use crate::{Error, Result};

/// Circular history buffer.
#[derive(Debug, Clone)]
pub struct Dictionary {
    buf: Vec<u8>,
    /// Position of the first byte not yet flushed.
    start: usize,
    /// Position of the next byte to write.
    pos: usize,
    /// Number of valid bytes, capped at `size`.
    full: usize,
    /// Position at which decoding has to pause for a flush.
    limit: usize,
    /// Wrap-around point.
    size: usize,
}

impl Dictionary {
    /// Creates a dictionary of `size` bytes, reusing the allocation of `spare`.
    ///
    /// `spare` is only reused when its capacity is exactly `size`; any other
    /// allocation is freed, so the dictionary never holds more memory than
    /// was reserved for it. The full size is reserved up front so that
    /// writes never reallocate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the reservation fails.
    pub fn with_buffer(size: usize, mut spare: Vec<u8>) -> Result<Self> {
        if spare.capacity() != size {
            spare = Vec::new();
        }
        spare.clear();
        spare
            .try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory { requested: size })?;
        Ok(Self {
            buf: spare,
            start: 0,
            pos: 0,
            full: 0,
            limit: 0,
            size,
        })
    }

    /// Returns the allocation so the next dictionary can reuse it.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }

    /// Forgets all history. Used on an LZMA2 dictionary reset.
    pub fn reset(&mut self) {
        self.start = 0;
        self.pos = 0;
        self.limit = 0;
        self.full = 0;
    }

    /// Returns the write position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Lets decoding continue for at most `out_max` more bytes.
    pub fn set_limit(&mut self, out_max: usize) {
        if self.size - self.pos <= out_max {
            self.limit = self.size;
        } else {
            self.limit = self.pos + out_max;
        }
    }

    /// Returns `true` if a byte can be written before the next flush.
    #[inline]
    pub fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    /// Returns the byte `dist + 1` positions back, or zero with no history.
    #[inline]
    pub fn get(&self, dist: u32) -> u8 {
        if self.full == 0 {
            return 0;
        }
        let dist = dist as usize;
        let offset = if dist >= self.pos {
            (self.pos + self.size).wrapping_sub(dist + 1)
        } else {
            self.pos - dist - 1
        };
        self.buf.get(offset).copied().unwrap_or(0)
    }

    /// Appends one byte.
    #[inline]
    pub fn put(&mut self, byte: u8) {
        if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
        } else {
            self.buf.push(byte);
        }
        self.pos += 1;
        if self.full < self.pos {
            self.full = self.pos;
        }
    }

    /// Copies up to `*len` bytes from `dist + 1` positions back.
    ///
    /// Stops at the limit; `*len` is reduced by the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the distance reaches before the start
    /// of the history.
    pub fn repeat(&mut self, dist: u32, len: &mut u32) -> Result<()> {
        let dist = dist as usize;
        if dist >= self.full || dist >= self.size {
            return Err(Error::corrupt(
                0,
                format!("match distance {} exceeds dictionary history {}", dist + 1, self.full),
            ));
        }

        let left = self.limit.saturating_sub(self.pos).min(*len as usize);
        *len -= left as u32;

        let mut back = if dist >= self.pos {
            self.pos + self.size - dist - 1
        } else {
            self.pos - dist - 1
        };
        for _ in 0..left {
            let byte = self.buf[back];
            self.put(byte);
            back += 1;
            if back == self.size {
                back = 0;
            }
        }
        Ok(())
    }

    /// Copies a stored LZMA2 chunk from `input` into both the history and `out`.
    ///
    /// Returns how many of the `left` bytes are still to be copied.
    pub fn copy_uncompressed(
        &mut self,
        input: &mut InputCursor<'_>,
        out: &mut OutputCursor<'_>,
        mut left: usize,
    ) -> usize {
        while left > 0 && !input.is_empty() && !out.is_full() {
            let n = left
                .min(input.len())
                .min(out.available())
                .min(self.size - self.pos);
            let data = input.take(n);
            self.write_slice(data);
            if self.pos == self.size {
                self.pos = 0;
            }
            out.write(data);
            self.start = self.pos;
            left -= n;
        }
        left
    }

    /// Copies everything decoded since the last flush to `out`.
    ///
    /// Returns the number of bytes copied. The caller must have bounded the
    /// amount with [`set_limit`](Self::set_limit).
    pub fn flush(&mut self, out: &mut OutputCursor<'_>) -> usize {
        let copied = out.write(&self.buf[self.start..self.pos]);
        debug_assert_eq!(copied, self.pos - self.start);
        if self.pos == self.size {
            self.pos = 0;
        }
        self.start = self.pos;
        copied
    }

    fn write_slice(&mut self, data: &[u8]) {
        let end = self.pos + data.len();
        let overlap = self.buf.len().min(end).saturating_sub(self.pos);
        self.buf[self.pos..self.pos + overlap].copy_from_slice(&data[..overlap]);
        self.buf.extend_from_slice(&data[overlap..]);
        self.pos = end;
        if self.full < self.pos {
            self.full = self.pos;
        }
    }
}
