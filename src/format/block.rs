//! Decoding of one block: compressed data, padding and check value.

use crate::codec::Pipeline;
use crate::streaming::{InputCursor, OutputCursor};
use crate::{Error, Result};

use super::check::{CHECK_SIZE_MAX, CheckKind, CheckVerifier, VerifyResult, to_hex};
use super::header::BlockHeader;
use super::vli::VLI_MAX;
use super::UNPADDED_SIZE_MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seq {
    Data,
    Padding,
    Check,
    Done,
}

/// Decoder for the body of a single block.
///
/// Created once the block header is parsed and memory for its filters has
/// been reserved; dropped after the check value has been verified.
#[derive(Debug, Clone)]
pub struct BlockDecoder {
    header: BlockHeader,
    pipeline: Pipeline,
    verifier: CheckVerifier,
    ignore_check: bool,
    /// Zero-based block number within the stream.
    number: u64,
    seq: Seq,
    compressed: u64,
    uncompressed: u64,
    compressed_limit: u64,
    uncompressed_limit: u64,
    padding: u64,
    stored: [u8; CHECK_SIZE_MAX],
    stored_len: usize,
}

impl BlockDecoder {
    /// Builds the filter chain of `header`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the dictionary cannot be allocated.
    pub fn new(
        header: BlockHeader,
        check: CheckKind,
        number: u64,
        ignore_check: bool,
        spare: Vec<u8>,
    ) -> Result<Self> {
        let pipeline = Pipeline::new(&header.filters, spare)?;
        let compressed_limit = header.compressed_size.unwrap_or(
            UNPADDED_SIZE_MAX - header.header_size as u64 - check.size() as u64,
        );
        let uncompressed_limit = header.uncompressed_size.unwrap_or(VLI_MAX);
        Ok(Self {
            header,
            pipeline,
            verifier: CheckVerifier::new(check),
            ignore_check,
            number,
            seq: Seq::Data,
            compressed: 0,
            uncompressed: 0,
            compressed_limit,
            uncompressed_limit,
            padding: 0,
            stored: [0; CHECK_SIZE_MAX],
            stored_len: 0,
        })
    }

    /// Returns the header, compressed data and check size together.
    pub fn unpadded_size(&self) -> u64 {
        self.header.header_size as u64 + self.compressed + self.verifier.kind().size() as u64
    }

    /// Returns the number of bytes produced so far.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed
    }

    /// Gives back the dictionary allocation.
    pub fn into_buffer(self) -> Vec<u8> {
        self.pipeline.into_buffer()
    }

    /// Advances through the block.
    ///
    /// Returns `true` once the check value has been read and verified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the data disagrees with the declared
    /// sizes or has non-zero padding, and [`Error::CheckMismatch`] if the
    /// check value differs (unless checks are ignored).
    pub fn decode(&mut self, input: &mut InputCursor<'_>, out: &mut OutputCursor<'_>) -> Result<bool> {
        loop {
            match self.seq {
                Seq::Data => {
                    if !self.decode_data(input, out)? {
                        return Ok(false);
                    }
                    log::debug!(
                        "block {}: {} compressed bytes, {} uncompressed bytes",
                        self.number,
                        self.compressed,
                        self.uncompressed
                    );
                    self.seq = Seq::Padding;
                }
                Seq::Padding => {
                    while (self.compressed + self.padding) % 4 != 0 {
                        let Some(byte) = input.read_byte() else {
                            return Ok(false);
                        };
                        if byte != 0x00 {
                            return Err(Error::corrupt(0, "non-zero block padding"));
                        }
                        self.padding += 1;
                    }
                    self.seq = Seq::Check;
                }
                Seq::Check => {
                    let size = self.verifier.kind().size();
                    let data = input.take(size - self.stored_len);
                    self.stored[self.stored_len..self.stored_len + data.len()].copy_from_slice(data);
                    self.stored_len += data.len();
                    if self.stored_len < size {
                        return Ok(false);
                    }
                    self.verify()?;
                    self.seq = Seq::Done;
                }
                Seq::Done => return Ok(true),
            }
        }
    }

    fn decode_data(&mut self, input: &mut InputCursor<'_>, out: &mut OutputCursor<'_>) -> Result<bool> {
        // Never hand the chain more than the declared sizes allow.
        let in_room = clamp(self.compressed_limit - self.compressed).min(input.len());
        let out_room = clamp(self.uncompressed_limit - self.uncompressed).min(out.available());

        let mut sub_in = InputCursor::new(&input.remaining()[..in_room]);
        let (finished, produced) = {
            let mut sub_out = OutputCursor::new(&mut out.unfilled()[..out_room]);
            let finished = self.pipeline.decode(&mut sub_in, &mut sub_out)?;
            self.verifier.update(sub_out.filled());
            (finished, sub_out.position())
        };
        let consumed = sub_in.position();
        input.advance(consumed);
        out.advance(produced);
        self.compressed += consumed as u64;
        self.uncompressed += produced as u64;

        if !finished {
            let comp_done = self.header.compressed_size == Some(self.compressed);
            let uncomp_done = self.header.uncompressed_size == Some(self.uncompressed);
            if comp_done && uncomp_done {
                return Err(Error::corrupt(0, "block data continues past its declared sizes"));
            }
            if comp_done && !out.is_full() {
                return Err(Error::corrupt(0, "block data ends before its declared compressed size"));
            }
            if uncomp_done && !input.is_empty() {
                return Err(Error::corrupt(0, "block produces more data than its declared uncompressed size"));
            }
            return Ok(false);
        }

        if self.header.compressed_size.is_some_and(|n| n != self.compressed) {
            return Err(Error::corrupt(0, "block compressed size does not match its header"));
        }
        if self.header.uncompressed_size.is_some_and(|n| n != self.uncompressed) {
            return Err(Error::corrupt(0, "block uncompressed size does not match its header"));
        }
        Ok(true)
    }

    fn verify(&self) -> Result<()> {
        let stored = &self.stored[..self.stored_len];
        match self.verifier.verify(stored) {
            VerifyResult::Match | VerifyResult::NoCheck | VerifyResult::Unsupported => Ok(()),
            VerifyResult::Mismatch { expected, actual } if self.ignore_check => {
                log::debug!(
                    "ignoring {} mismatch in block {}: expected {}, got {}",
                    self.verifier.kind(),
                    self.number,
                    to_hex(&expected),
                    to_hex(&actual)
                );
                Ok(())
            }
            VerifyResult::Mismatch { expected, actual } => Err(Error::CheckMismatch {
                kind: self.verifier.kind(),
                block: self.number,
                expected: to_hex(&expected),
                actual: to_hex(&actual),
            }),
        }
    }
}

fn clamp(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
