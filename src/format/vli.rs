//! Variable-length integers.
//!
//! The .xz format stores sizes and counts as little-endian base-128
//! numbers: each byte carries seven bits of the value, and the high bit
//! says whether another byte follows.
//!
//! - `0xxxxxxx` (1 byte): value 0-127
//! - `1xxxxxxx 0xxxxxxx` (2 bytes): value 0-16383
//! - And so on, up to 9 bytes for 63 bits.
//!
//! Encodings with trailing zero bytes (`0x80 0x00` for zero) are invalid.

use crate::{Error, Result};

/// Largest value a VLI can hold.
pub const VLI_MAX: u64 = u64::MAX / 2;

/// Longest valid encoding in bytes.
pub const VLI_BYTES_MAX: usize = 9;

/// Decodes a VLI from the start of `buf`.
///
/// Returns the value and the number of bytes it occupied.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if the encoding runs past `buf`, exceeds
/// nine bytes, or is not minimal.
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    let mut reader = VliReader::new();
    for (i, &byte) in buf.iter().enumerate() {
        if let Some(value) = reader.push(byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(Error::corrupt(0, "variable-length integer runs past the end of its field"))
}

/// Returns the encoded size of `value` in bytes.
pub fn size(value: u64) -> usize {
    let mut n = 1;
    let mut v = value >> 7;
    while v != 0 {
        n += 1;
        v >>= 7;
    }
    n
}

/// Resumable VLI decoder fed one byte at a time.
#[derive(Debug, Clone, Default)]
pub struct VliReader {
    value: u64,
    bytes: usize,
}

impl VliReader {
    /// Creates a reader at the start of a number.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns the value once the last byte has been seen.
    ///
    /// The reader starts over after returning a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for overlong or non-minimal encodings.
    pub fn push(&mut self, byte: u8) -> Result<Option<u64>> {
        if self.bytes == VLI_BYTES_MAX {
            return Err(Error::corrupt(0, "variable-length integer is too long"));
        }

        self.value |= u64::from(byte & 0x7F) << (self.bytes * 7);
        self.bytes += 1;

        if byte & 0x80 != 0 {
            if self.bytes == VLI_BYTES_MAX {
                return Err(Error::corrupt(0, "variable-length integer is too long"));
            }
            return Ok(None);
        }

        if byte == 0x00 && self.bytes > 1 {
            return Err(Error::corrupt(0, "variable-length integer is not minimally encoded"));
        }

        let value = self.value;
        *self = Self::new();
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte() {
        assert_eq!(decode(&[0x00]).unwrap(), (0, 1));
        assert_eq!(decode(&[0x7F, 0xFF]).unwrap(), (127, 1));
    }

    #[test]
    fn test_multi_byte() {
        assert_eq!(decode(&[0x80, 0x01]).unwrap(), (128, 2));
        assert_eq!(decode(&[0xFF, 0x7F]).unwrap(), (16383, 2));
        assert_eq!(decode(&[0xE5, 0x8E, 0x26]).unwrap(), (624_485, 3));
    }

    #[test]
    fn test_max_value() {
        let mut buf = [0xFFu8; 9];
        buf[8] = 0x7F;
        assert_eq!(decode(&buf).unwrap(), (VLI_MAX, 9));
        assert_eq!(size(VLI_MAX), 9);
    }

    #[test]
    fn test_too_long() {
        let buf = [0x80u8; 10];
        assert!(decode(&buf).unwrap_err().is_corruption());
    }

    #[test]
    fn test_non_minimal() {
        assert!(decode(&[0x80, 0x00]).unwrap_err().is_corruption());
    }

    #[test]
    fn test_truncated() {
        assert!(decode(&[0x80]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(size(0), 1);
        assert_eq!(size(127), 1);
        assert_eq!(size(128), 2);
        assert_eq!(size(16384), 3);
    }

    #[test]
    fn test_reader_resumes() {
        let mut reader = VliReader::new();
        assert_eq!(reader.push(0xE5).unwrap(), None);
        assert_eq!(reader.push(0x8E).unwrap(), None);
        assert_eq!(reader.push(0x26).unwrap(), Some(624_485));
        assert_eq!(reader.push(0x05).unwrap(), Some(5));
    }
}
