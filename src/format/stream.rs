//! Incremental parser for one .xz stream.
//!
//! The parser walks a stream from its header to its footer:
//!
//! ```text
//! StreamHeader -> BlockHeader -> Block -> BlockHeader -> ... -> Index -> StreamFooter -> Done
//! ```
//!
//! Headers cut off by the end of an input window are collected in a
//! scratch buffer, so every state can suspend at any byte. Concatenated
//! streams are handled by the caller, which calls
//! [`StreamParser::next_stream`] between them.

use std::mem;

use crate::codec::Pipeline;
use crate::streaming::{InputCursor, MemoryLimiter, OutputCursor};
use crate::{Error, Result};

use super::block::BlockDecoder;
use super::check::CheckKind;
use super::header::{BlockHeader, StreamFlags, StreamFooter, StreamHeader};
use super::index::{IndexDecoder, IndexHash};
use super::{BLOCK_HEADER_SIZE_MAX, STREAM_HEADER_SIZE};

/// What a call to [`StreamParser::decode`] stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Input ran out or output is full.
    Suspended,
    /// The stream header was read; carries the stream's check type.
    StreamHeader(CheckKind),
    /// A block and its check value were fully decoded.
    BlockDone,
    /// The stream footer was read and verified.
    StreamEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seq {
    StreamHeader,
    BlockHeader,
    /// Header parsed; waiting for the memory reservation.
    BlockInit,
    Block,
    Index,
    StreamFooter,
    Done,
}

/// Single-stream state machine.
#[derive(Debug, Clone)]
pub struct StreamParser {
    seq: Seq,
    /// Partial stream header, block header or stream footer.
    scratch: Vec<u8>,
    flags: Option<StreamFlags>,
    pending: Option<BlockHeader>,
    block: Option<BlockDecoder>,
    /// Memory reserved for the active block.
    reserved: u64,
    blocks: IndexHash,
    index: IndexDecoder,
    /// Dictionary allocation kept between blocks.
    spare: Vec<u8>,
    first_stream: bool,
    ignore_check: bool,
}

impl StreamParser {
    /// Creates a parser expecting the first stream header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the scratch buffer cannot be allocated.
    pub fn new(ignore_check: bool) -> Result<Self> {
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(BLOCK_HEADER_SIZE_MAX)
            .map_err(|_| Error::OutOfMemory {
                requested: BLOCK_HEADER_SIZE_MAX,
            })?;
        Ok(Self {
            seq: Seq::StreamHeader,
            scratch,
            flags: None,
            pending: None,
            block: None,
            reserved: 0,
            blocks: IndexHash::new(),
            index: IndexDecoder::new(),
            spare: Vec::new(),
            first_stream: true,
            ignore_check,
        })
    }

    /// Returns to the first stream header, keeping allocated buffers.
    pub fn reset(&mut self, ignore_check: bool, limiter: &mut MemoryLimiter) {
        self.next_stream(limiter);
        self.first_stream = true;
        self.ignore_check = ignore_check;
    }

    /// Prepares for the header of a following concatenated stream.
    pub fn next_stream(&mut self, limiter: &mut MemoryLimiter) {
        self.release(limiter);
        self.seq = Seq::StreamHeader;
        self.scratch.clear();
        self.flags = None;
        self.pending = None;
        self.blocks = IndexHash::new();
        self.index = IndexDecoder::new();
        self.first_stream = false;
    }

    /// Drops the active block and returns its memory to `limiter`.
    pub fn release(&mut self, limiter: &mut MemoryLimiter) {
        if let Some(block) = self.block.take() {
            self.spare = block.into_buffer();
        }
        limiter.release(self.reserved);
        self.reserved = 0;
    }

    /// Frees the kept dictionary allocation if it is larger than `limit`.
    ///
    /// The allocation is only kept between blocks, while nothing is
    /// reserved for it, so a lowered ceiling must also bound it.
    pub fn shrink_to_limit(&mut self, limit: u64) {
        if self.spare.capacity() as u64 > limit {
            log::debug!(
                "dropping {} byte dictionary allocation above the {} byte limit",
                self.spare.capacity(),
                limit
            );
            self.spare = Vec::new();
        }
    }

    /// Frees every buffer the parser owns.
    pub fn free_buffers(&mut self) {
        self.spare = Vec::new();
        self.scratch = Vec::new();
    }

    /// Returns the stream's check type once the stream header has been read.
    pub fn check_kind(&self) -> Option<CheckKind> {
        self.flags.map(|flags| flags.check)
    }

    /// Names the structure being read, for truncation errors.
    pub fn position_name(&self) -> &'static str {
        match self.seq {
            Seq::StreamHeader => "stream header",
            Seq::BlockHeader | Seq::BlockInit => "block header",
            Seq::Block => "block",
            Seq::Index => "index",
            Seq::StreamFooter => "stream footer",
            Seq::Done => "end of stream",
        }
    }

    /// Advances through the stream.
    ///
    /// Stops at every header, block and footer boundary so the caller can
    /// report progress; otherwise runs until a window is exhausted.
    ///
    /// # Errors
    ///
    /// Returns any header, block or index error, and
    /// [`Error::MemoryLimitExceeded`] if a block's filters do not fit
    /// within `limiter`. The latter leaves the parser before the block, so
    /// the call can be retried with a higher limit.
    pub fn decode(
        &mut self,
        input: &mut InputCursor<'_>,
        out: &mut OutputCursor<'_>,
        limiter: &mut MemoryLimiter,
    ) -> Result<Progress> {
        loop {
            match self.seq {
                Seq::StreamHeader => {
                    if !self.fill(input, STREAM_HEADER_SIZE) {
                        return Ok(Progress::Suspended);
                    }
                    let header = match StreamHeader::parse(&self.take_scratch12()) {
                        Err(Error::Format(_)) if !self.first_stream => {
                            return Err(Error::corrupt(0, "concatenated data is not an .xz stream"));
                        }
                        other => other?,
                    };
                    let check = header.flags.check;
                    log::debug!("stream header: check {}", check);
                    if !check.is_supported() {
                        log::warn!("{} cannot be verified by this build; block checks will be skipped", check);
                    }
                    self.flags = Some(header.flags);
                    self.seq = Seq::BlockHeader;
                    return Ok(Progress::StreamHeader(check));
                }
                Seq::BlockHeader => {
                    let first = match self.scratch.first() {
                        Some(&b) => b,
                        None => match input.remaining().first() {
                            Some(&0x00) => {
                                self.seq = Seq::Index;
                                continue;
                            }
                            Some(&b) => b,
                            None => return Ok(Progress::Suspended),
                        },
                    };
                    if !self.fill(input, BlockHeader::size_from_first_byte(first)) {
                        return Ok(Progress::Suspended);
                    }
                    let header = BlockHeader::parse(&self.scratch, self.check()?)?;
                    self.scratch.clear();
                    self.pending = Some(header);
                    self.seq = Seq::BlockInit;
                }
                Seq::BlockInit => {
                    self.start_block(limiter)?;
                    self.seq = Seq::Block;
                }
                Seq::Block => {
                    let block = self
                        .block
                        .as_mut()
                        .ok_or(Error::ProgError("no active block"))?;
                    if !block.decode(input, out)? {
                        return Ok(Progress::Suspended);
                    }
                    self.finish_block(limiter)?;
                    self.seq = Seq::BlockHeader;
                    return Ok(Progress::BlockDone);
                }
                Seq::Index => {
                    if !self.index.decode(input, &self.blocks)? {
                        return Ok(Progress::Suspended);
                    }
                    self.seq = Seq::StreamFooter;
                }
                Seq::StreamFooter => {
                    if !self.fill(input, STREAM_HEADER_SIZE) {
                        return Ok(Progress::Suspended);
                    }
                    let footer = StreamFooter::parse(&self.take_scratch12())?;
                    if Some(footer.flags) != self.flags {
                        return Err(Error::corrupt(0, "stream footer flags do not match the header"));
                    }
                    if footer.backward_size != self.index.size() {
                        return Err(Error::corrupt(
                            0,
                            format!(
                                "stream footer gives index size {} but the index has {} bytes",
                                footer.backward_size,
                                self.index.size()
                            ),
                        ));
                    }
                    log::debug!(
                        "stream end: {} blocks, {} uncompressed bytes",
                        self.blocks.count(),
                        self.blocks.uncompressed_size()
                    );
                    self.seq = Seq::Done;
                    return Ok(Progress::StreamEnd);
                }
                Seq::Done => return Ok(Progress::StreamEnd),
            }
        }
    }

    fn check(&self) -> Result<CheckKind> {
        self.check_kind()
            .ok_or(Error::ProgError("block header before stream header"))
    }

    /// Appends input to the scratch buffer until it holds `size` bytes.
    fn fill(&mut self, input: &mut InputCursor<'_>, size: usize) -> bool {
        let want = size.saturating_sub(self.scratch.len());
        self.scratch.extend_from_slice(input.take(want));
        self.scratch.len() == size
    }

    fn take_scratch12(&mut self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf.copy_from_slice(&self.scratch[..STREAM_HEADER_SIZE]);
        self.scratch.clear();
        buf
    }

    fn start_block(&mut self, limiter: &mut MemoryLimiter) -> Result<()> {
        let check = self.check()?;
        let header = self
            .pending
            .as_ref()
            .ok_or(Error::ProgError("no pending block header"))?;
        let usage = Pipeline::memory_usage(&header.filters);

        if let Err(err) = limiter.reserve(usage) {
            log::warn!(
                "block {} needs {} bytes for its filters; memory limit is {} bytes",
                self.blocks.count(),
                usage,
                limiter.limit()
            );
            return Err(err);
        }

        let header = self
            .pending
            .take()
            .ok_or(Error::ProgError("no pending block header"))?;
        let spare = mem::take(&mut self.spare);
        match BlockDecoder::new(header, check, self.blocks.count(), self.ignore_check, spare) {
            Ok(block) => {
                self.block = Some(block);
                self.reserved = usage;
                Ok(())
            }
            Err(err) => {
                limiter.release(usage);
                Err(err)
            }
        }
    }

    fn finish_block(&mut self, limiter: &mut MemoryLimiter) -> Result<()> {
        let block = self.block.take().ok_or(Error::ProgError("no active block"))?;
        self.blocks
            .append(block.unpadded_size(), block.uncompressed_size())?;
        self.spare = block.into_buffer();
        limiter.release(self.reserved);
        self.reserved = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Checksum, Crc32};
    use crate::format::HEADER_MAGIC;

    fn stream_header() -> Vec<u8> {
        let mut buf = HEADER_MAGIC.to_vec();
        buf.extend_from_slice(&[0x00, 0x01]);
        buf.extend_from_slice(&Crc32::compute(&[0x00, 0x01]).to_le_bytes());
        buf
    }

    #[test]
    fn test_header_split_across_calls() {
        let header = stream_header();
        let mut parser = StreamParser::new(false).unwrap();
        let mut limiter = MemoryLimiter::unlimited();
        let mut sink = [0u8; 0];

        for (i, &byte) in header.iter().enumerate() {
            let data = [byte];
            let mut input = InputCursor::new(&data);
            let mut out = OutputCursor::new(&mut sink);
            let progress = parser.decode(&mut input, &mut out, &mut limiter).unwrap();
            if i + 1 < header.len() {
                assert_eq!(progress, Progress::Suspended);
                assert_eq!(parser.position_name(), "stream header");
            } else {
                assert_eq!(progress, Progress::StreamHeader(CheckKind::Crc32));
            }
        }
        assert_eq!(parser.check_kind(), Some(CheckKind::Crc32));
    }

    #[test]
    fn test_bad_magic_first_and_later_stream() {
        let mut data = stream_header();
        data[1] = b'8';
        let mut limiter = MemoryLimiter::unlimited();
        let mut sink = [0u8; 0];

        let mut parser = StreamParser::new(false).unwrap();
        let mut input = InputCursor::new(&data);
        let mut out = OutputCursor::new(&mut sink);
        let err = parser.decode(&mut input, &mut out, &mut limiter).unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let mut parser = StreamParser::new(false).unwrap();
        parser.next_stream(&mut limiter);
        let mut input = InputCursor::new(&data);
        let err = parser.decode(&mut input, &mut out, &mut limiter).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_shrink_to_limit_drops_kept_dictionary() {
        let mut parser = StreamParser::new(false).unwrap();
        parser.spare = Vec::with_capacity(1 << 20);

        parser.shrink_to_limit(1 << 21);
        assert!(parser.spare.capacity() >= 1 << 20);

        parser.shrink_to_limit(1 << 16);
        assert_eq!(parser.spare.capacity(), 0);
    }

    #[test]
    fn test_memory_limit_parks_before_block() {
        let mut data = stream_header();
        // Block header: LZMA2 with a 1 MiB dictionary.
        let body = [0x02, 0x00, 0x21, 0x01, 0x10, 0x00, 0x00, 0x00];
        data.extend_from_slice(&body);
        data.extend_from_slice(&Crc32::compute(&body).to_le_bytes());

        let mut parser = StreamParser::new(false).unwrap();
        let mut limiter = MemoryLimiter::new(1 << 16);
        let mut sink = [0u8; 16];
        let mut input = InputCursor::new(&data);
        let mut out = OutputCursor::new(&mut sink);

        assert!(matches!(
            parser.decode(&mut input, &mut out, &mut limiter),
            Ok(Progress::StreamHeader(_))
        ));
        let err = parser.decode(&mut input, &mut out, &mut limiter).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(limiter.current_usage(), 0);
        assert_eq!(out.position(), 0);

        limiter.set_limit(u64::MAX).unwrap();
        assert_eq!(
            parser.decode(&mut input, &mut out, &mut limiter).unwrap(),
            Progress::Suspended
        );
        assert!(limiter.current_usage() > 1 << 20);
        assert_eq!(parser.position_name(), "block");

        parser.release(&mut limiter);
        assert_eq!(limiter.current_usage(), 0);
    }
}
