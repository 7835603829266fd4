//! LZMA2 chunk decoder.
//!
//! LZMA2 wraps LZMA in chunks. Each chunk starts with a control byte:
//!
//! | Control | Meaning |
//! |---------|---------|
//! | `0x00` | End of the LZMA2 data |
//! | `0x01` | Dictionary reset, then a stored chunk |
//! | `0x02` | Stored chunk without dictionary reset |
//! | `0x80..=0x9F` | LZMA chunk, no reset |
//! | `0xA0..=0xBF` | LZMA chunk, state reset |
//! | `0xC0..=0xDF` | LZMA chunk, state reset and new properties |
//! | `0xE0..=0xFF` | LZMA chunk, dictionary reset, state reset and new properties |
//!
//! LZMA chunks carry 21 bits of uncompressed size (the low 5 bits of the
//! control byte plus two bytes) and 16 bits of compressed size.
//!
//! Symbols are decoded straight from the caller's input while at least
//! [`LZMA_IN_REQUIRED`] bytes are available. Near the end of the input, the
//! remaining bytes are moved into a small zero-padded buffer so a symbol
//! split across two calls decodes exactly as if the input had been
//! contiguous.

use super::dict::Dictionary;
use super::lzma::{LzmaDecoder, LzmaProps};
use super::lzma_rc::{LZMA_IN_REQUIRED, RangeDecoder, RcInput};
use crate::streaming::{InputCursor, OutputCursor};
use crate::{Error, Result};

const TEMP_SIZE: usize = 3 * LZMA_IN_REQUIRED;

/// Decodes the dictionary size from the LZMA2 property byte.
///
/// The property byte encodes dictionary size as:
/// - 0-39: `2^(prop/2 + 12)` for even values, `3 * 2^(prop/2 + 11)` for odd
/// - 40: 4 GiB - 1
///
/// # Errors
///
/// Returns [`Error::UnsupportedOptions`] for values above 40.
pub fn dict_size_from_prop(prop: u8) -> Result<u32> {
    if prop > 40 {
        return Err(Error::unsupported(format!(
            "invalid LZMA2 dictionary size property: {}",
            prop
        )));
    }

    if prop == 40 {
        return Ok(0xFFFF_FFFF);
    }

    let base_log = u32::from(prop) / 2 + 12;
    let dict_size = if prop % 2 == 0 {
        1u32 << base_log
    } else {
        3u32 << (base_log - 1)
    };
    Ok(dict_size)
}

/// Rounds a dictionary size up to a multiple of 16 so position states
/// stay aligned across wrap-around.
fn dict_alloc_size(dict_size: u32) -> u64 {
    (u64::from(dict_size) + 15) & !15
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Control,
    Uncompressed1,
    Uncompressed2,
    Compressed0,
    Compressed1,
    Properties,
    LzmaPrepare,
    LzmaRun,
    Copy,
}

/// Incremental LZMA2 decoder.
#[derive(Debug, Clone)]
pub struct Lzma2Decoder {
    dict: Dictionary,
    rc: RangeDecoder,
    lzma: LzmaDecoder,
    sequence: Sequence,
    next_sequence: Sequence,
    /// Uncompressed bytes left in the current chunk.
    uncompressed: usize,
    /// Compressed bytes left in the current chunk.
    compressed: usize,
    need_dict_reset: bool,
    need_props: bool,
    temp: [u8; TEMP_SIZE],
    temp_size: usize,
    finished: bool,
}

impl Lzma2Decoder {
    /// Returns the memory to reserve for a decoder with the given dictionary size.
    pub fn memory_usage(dict_size: u32) -> u64 {
        dict_alloc_size(dict_size) + (size_of::<Self>() + LzmaDecoder::HEAP_SIZE) as u64
    }

    /// Creates a decoder, building its dictionary in the allocation of `spare`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the dictionary cannot be allocated.
    pub fn new(dict_size: u32, spare: Vec<u8>) -> Result<Self> {
        let alloc = usize::try_from(dict_alloc_size(dict_size)).map_err(|_| Error::OutOfMemory {
            requested: usize::MAX,
        })?;
        Ok(Self {
            dict: Dictionary::with_buffer(alloc, spare)?,
            rc: RangeDecoder::new(),
            lzma: LzmaDecoder::new(),
            sequence: Sequence::Control,
            next_sequence: Sequence::Control,
            uncompressed: 0,
            compressed: 0,
            need_dict_reset: true,
            need_props: true,
            temp: [0; TEMP_SIZE],
            temp_size: 0,
            finished: false,
        })
    }

    /// Gives back the dictionary allocation.
    pub fn into_buffer(self) -> Vec<u8> {
        self.dict.into_buffer()
    }

    /// Returns `true` once the end marker has been read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes as much as the two windows allow.
    ///
    /// Returns `true` when the end-of-data control byte has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for invalid control bytes, missing resets,
    /// bad properties, or LZMA data that does not match the chunk sizes.
    pub fn decode(&mut self, input: &mut InputCursor<'_>, out: &mut OutputCursor<'_>) -> Result<bool> {
        if self.finished {
            return Ok(true);
        }

        loop {
            match self.sequence {
                Sequence::Control => {
                    let Some(control) = input.read_byte() else {
                        return Ok(false);
                    };
                    log::trace!("LZMA2 control byte {:#04x}", control);

                    if control == 0x00 {
                        self.finished = true;
                        return Ok(true);
                    }

                    if control >= 0xE0 || control == 0x01 {
                        self.need_props = true;
                        self.need_dict_reset = false;
                        self.dict.reset();
                    } else if self.need_dict_reset {
                        return Err(lzma2_corrupt("first chunk does not reset the dictionary"));
                    }

                    if control < 0x80 {
                        if control > 0x02 {
                            return Err(lzma2_corrupt(format!("invalid control byte {:#04x}", control)));
                        }
                        self.sequence = Sequence::Compressed0;
                        self.next_sequence = Sequence::Copy;
                        continue;
                    }

                    self.uncompressed = usize::from(control & 0x1F) << 16;
                    self.sequence = Sequence::Uncompressed1;

                    if control >= 0xC0 {
                        self.need_props = false;
                        self.next_sequence = Sequence::Properties;
                    } else if self.need_props {
                        return Err(lzma2_corrupt("LZMA chunk without properties"));
                    } else {
                        self.next_sequence = Sequence::LzmaPrepare;
                        if control >= 0xA0 {
                            self.lzma.reset();
                        }
                    }
                }
                Sequence::Uncompressed1 => {
                    let Some(byte) = input.read_byte() else {
                        return Ok(false);
                    };
                    self.uncompressed += usize::from(byte) << 8;
                    self.sequence = Sequence::Uncompressed2;
                }
                Sequence::Uncompressed2 => {
                    let Some(byte) = input.read_byte() else {
                        return Ok(false);
                    };
                    self.uncompressed += usize::from(byte) + 1;
                    self.sequence = Sequence::Compressed0;
                }
                Sequence::Compressed0 => {
                    let Some(byte) = input.read_byte() else {
                        return Ok(false);
                    };
                    self.compressed = usize::from(byte) << 8;
                    self.sequence = Sequence::Compressed1;
                }
                Sequence::Compressed1 => {
                    let Some(byte) = input.read_byte() else {
                        return Ok(false);
                    };
                    self.compressed += usize::from(byte) + 1;
                    self.sequence = self.next_sequence;
                }
                Sequence::Properties => {
                    let Some(byte) = input.read_byte() else {
                        return Ok(false);
                    };
                    self.lzma.set_props(LzmaProps::from_byte(byte)?);
                    self.sequence = Sequence::LzmaPrepare;
                }
                Sequence::LzmaPrepare => {
                    if self.compressed < 5 {
                        return Err(lzma2_corrupt("LZMA chunk shorter than the range coder header"));
                    }
                    if !self.rc.read_init(input) {
                        return Ok(false);
                    }
                    self.compressed -= 5;
                    self.sequence = Sequence::LzmaRun;
                }
                Sequence::LzmaRun => {
                    let in_before = input.position();
                    let out_before = out.position();

                    self.dict.set_limit(out.available().min(self.uncompressed));
                    self.decode_lzma(input)?;
                    self.uncompressed -= self.dict.flush(out);

                    if self.uncompressed == 0 {
                        if self.compressed > 0 || self.lzma.has_pending_match() || !self.rc.is_finished() {
                            return Err(lzma2_corrupt("LZMA chunk sizes do not match its data"));
                        }
                        self.rc.reset();
                        self.sequence = Sequence::Control;
                    } else if out.is_full() || (input.is_empty() && self.temp_size < self.compressed) {
                        return Ok(false);
                    } else if input.position() == in_before && out.position() == out_before {
                        return Err(lzma2_corrupt("LZMA decoder made no progress"));
                    }
                }
                Sequence::Copy => {
                    if input.is_empty() {
                        return Ok(false);
                    }
                    self.compressed = self.dict.copy_uncompressed(input, out, self.compressed);
                    if self.compressed > 0 {
                        return Ok(false);
                    }
                    self.sequence = Sequence::Control;
                }
            }
        }
    }

    /// Runs the symbol decoder over the caller's input, staging the tail
    /// of the input in `temp` when fewer than [`LZMA_IN_REQUIRED`] bytes remain.
    fn decode_lzma(&mut self, input: &mut InputCursor<'_>) -> Result<()> {
        if self.temp_size > 0 || self.compressed == 0 {
            let take = (2 * LZMA_IN_REQUIRED - self.temp_size)
                .min(self.compressed - self.temp_size)
                .min(input.len());
            let fill = self.temp_size + take;
            self.temp[self.temp_size..fill].copy_from_slice(&input.remaining()[..take]);

            let limit = if fill == self.compressed {
                self.temp[fill..].fill(0);
                fill
            } else if fill < LZMA_IN_REQUIRED {
                self.temp_size = fill;
                input.advance(take);
                return Ok(());
            } else {
                fill - LZMA_IN_REQUIRED
            };

            let mut rc_input = RcInput::new(&self.temp, limit);
            self.lzma.decode(&mut self.dict, &mut self.rc, &mut rc_input)?;
            let used = rc_input.position();

            if used > fill {
                return Err(lzma2_corrupt("LZMA data runs past the end of its chunk"));
            }
            self.compressed -= used;

            if used < self.temp_size {
                self.temp.copy_within(used..self.temp_size, 0);
                self.temp_size -= used;
                return Ok(());
            }

            input.advance(used - self.temp_size);
            self.temp_size = 0;
        }

        let available = input.len();
        if available >= LZMA_IN_REQUIRED {
            let limit = if available >= self.compressed + LZMA_IN_REQUIRED {
                self.compressed
            } else {
                available - LZMA_IN_REQUIRED
            };
            let mut rc_input = RcInput::new(input.remaining(), limit);
            self.lzma.decode(&mut self.dict, &mut self.rc, &mut rc_input)?;
            let used = rc_input.position();

            if used > self.compressed {
                return Err(lzma2_corrupt("LZMA data runs past the end of its chunk"));
            }
            self.compressed -= used;
            input.advance(used);
        }

        let available = input.len();
        if available < LZMA_IN_REQUIRED {
            let n = available.min(self.compressed);
            self.temp[..n].copy_from_slice(&input.remaining()[..n]);
            self.temp_size = n;
            input.advance(n);
        }

        Ok(())
    }
}

fn lzma2_corrupt(reason: impl Into<String>) -> Error {
    let reason: String = reason.into();
    Error::corrupt(0, format!("LZMA2: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(data: &[u8], out_size: usize) -> Result<(Vec<u8>, bool)> {
        let mut decoder = Lzma2Decoder::new(4096, Vec::new())?;
        let mut input = InputCursor::new(data);
        let mut buf = vec![0u8; out_size];
        let mut output = OutputCursor::new(&mut buf);
        let end = decoder.decode(&mut input, &mut output)?;
        let written = output.position();
        buf.truncate(written);
        Ok((buf, end))
    }

    #[test]
    fn test_dict_size_from_prop() {
        assert_eq!(dict_size_from_prop(0).unwrap(), 4096);
        assert_eq!(dict_size_from_prop(1).unwrap(), 6144);
        assert_eq!(dict_size_from_prop(18).unwrap(), 2 * 1024 * 1024);
        assert_eq!(dict_size_from_prop(22).unwrap(), 8 * 1024 * 1024);
        assert_eq!(dict_size_from_prop(40).unwrap(), 0xFFFF_FFFF);
        assert!(dict_size_from_prop(41).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_memory_usage_includes_dictionary() {
        let small = Lzma2Decoder::memory_usage(4096);
        let large = Lzma2Decoder::memory_usage(1 << 20);
        assert!(small > 4096);
        assert_eq!(large - small, (1 << 20) - 4096);
        assert_eq!(
            Lzma2Decoder::memory_usage(u32::MAX) - Lzma2Decoder::memory_usage(0),
            1 << 32
        );
    }

    #[test]
    fn test_stored_chunks() {
        // Reset + stored "abc", stored "de", end.
        let data = [0x01, 0x00, 0x02, b'a', b'b', b'c', 0x02, 0x00, 0x01, b'd', b'e', 0x00];
        let (out, end) = decode_all(&data, 64).unwrap();
        assert_eq!(out, b"abcde");
        assert!(end);
    }

    #[test]
    fn test_empty_stream() {
        let (out, end) = decode_all(&[0x00], 16).unwrap();
        assert!(out.is_empty());
        assert!(end);
    }

    #[test]
    fn test_missing_dict_reset() {
        let data = [0x02, 0x00, 0x00, b'a', 0x00];
        assert!(decode_all(&data, 16).unwrap_err().is_corruption());
    }

    #[test]
    fn test_lzma_chunk_without_props() {
        let data = [0x01, 0x00, 0x00, b'a', 0x80, 0x00, 0x00, 0x00, 0x05];
        assert!(decode_all(&data, 16).unwrap_err().is_corruption());
    }

    #[test]
    fn test_invalid_control_byte() {
        let data = [0x01, 0x00, 0x00, b'a', 0x03];
        assert!(decode_all(&data, 16).unwrap_err().is_corruption());
    }

    #[test]
    fn test_stored_chunk_split_input_and_output() {
        let data = [0x01, 0x00, 0x04, b'h', b'e', b'l', b'l', b'o', 0x00];
        let mut decoder = Lzma2Decoder::new(4096, Vec::new()).unwrap();
        let mut result = Vec::new();

        for chunk in data.chunks(2) {
            let mut input = InputCursor::new(chunk);
            while !input.is_empty() {
                let mut buf = [0u8; 1];
                let mut output = OutputCursor::new(&mut buf);
                decoder.decode(&mut input, &mut output).unwrap();
                result.extend_from_slice(output.filled());
            }
        }
        assert_eq!(result, b"hello");
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_chunk_shorter_than_rc_header() {
        // LZMA chunk with props declaring a compressed size of 4.
        let data = [0xE0, 0x00, 0x00, 0x00, 0x03, 0x5D];
        assert!(decode_all(&data, 16).unwrap_err().is_corruption());
    }
}
