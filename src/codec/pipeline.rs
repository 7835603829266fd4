//! The running filter chain of one block.
//!
//! LZMA2 sits at the input end. Every other filter wraps the rest of the
//! chain: it asks the inner stages for output, converts it in place, and
//! keeps the few trailing bytes it cannot convert yet (an instruction cut
//! in half by the window edge) in a small holding buffer.
//!
//! # Data Flow
//!
//! For a header listing `[x86, delta, lzma2]`:
//!
//! ```text
//! packed -> lzma2 -> delta -> x86 -> output
//! ```

use std::mem::size_of;

use super::filters::SimpleFilter;
use super::lzma2::Lzma2Decoder;
use super::{Filter, validate_chain};
use crate::streaming::{InputCursor, OutputCursor};
use crate::{Error, Result};

/// Largest holding buffer: twice the IA-64 bundle size.
const HOLD_MAX: usize = 32;

/// Returns the memory one non-LZMA2 stage needs.
pub(crate) fn stage_memory_usage() -> u64 {
    size_of::<SimpleStage>() as u64
}

#[derive(Debug, Clone)]
struct SimpleStage {
    filter: SimpleFilter,
    /// Stream position of the next byte handed to the filter.
    now_pos: u32,
    /// The inner stages have produced their last byte.
    end_was_reached: bool,
    /// Start of the bytes in `buffer` not yet written out.
    pos: usize,
    /// End of the converted bytes in `buffer`.
    filtered: usize,
    /// End of all bytes in `buffer`.
    size: usize,
    capacity: usize,
    buffer: [u8; HOLD_MAX],
}

impl SimpleStage {
    fn new(filter: SimpleFilter, start_offset: u32) -> Self {
        let capacity = 2 * filter.lookahead();
        debug_assert!(capacity <= HOLD_MAX);
        Self {
            filter,
            now_pos: start_offset,
            end_was_reached: false,
            pos: 0,
            filtered: 0,
            size: 0,
            capacity,
            buffer: [0; HOLD_MAX],
        }
    }

    /// Pulls bytes from `next` into `out`, converting them on the way.
    ///
    /// Returns `true` once the last byte has been written to `out`.
    fn code<F>(
        &mut self,
        input: &mut InputCursor<'_>,
        out: &mut OutputCursor<'_>,
        mut next: F,
    ) -> Result<bool>
    where
        F: FnMut(&mut InputCursor<'_>, &mut OutputCursor<'_>) -> Result<bool>,
    {
        // Converted bytes left over from the previous call go first.
        if self.pos < self.filtered {
            self.pos += out.write(&self.buffer[self.pos..self.filtered]);
            if self.pos < self.filtered {
                return Ok(false);
            }
            if self.end_was_reached {
                return Ok(true);
            }
        }
        self.filtered = 0;

        let out_avail = out.available();
        let buf_avail = self.size - self.pos;
        if out_avail > buf_avail || buf_avail == 0 {
            // Decode straight into `out` behind the held bytes and convert there.
            let out_start = out.position();
            out.write(&self.buffer[self.pos..self.size]);

            if next(input, out)? {
                self.end_was_reached = true;
            }

            let size = out.position() - out_start;
            let done = if size == 0 {
                0
            } else {
                let (filled, _) = out.split();
                Self::convert(&mut self.filter, &mut self.now_pos, &mut filled[out_start..])
            };
            let unfiltered = size - done;

            self.pos = 0;
            self.size = unfiltered;

            if self.end_was_reached {
                // The final bytes stay as they are.
                self.size = 0;
            } else if unfiltered > 0 {
                out.rewind(unfiltered);
                self.buffer[..unfiltered].copy_from_slice(&out.unfilled()[..unfiltered]);
            }
        } else if self.pos > 0 {
            self.buffer.copy_within(self.pos..self.size, 0);
            self.size -= self.pos;
            self.pos = 0;
        }

        if self.size > 0 {
            // Too little room in `out`: top up the holding buffer instead.
            let mut hold = OutputCursor::with_position(&mut self.buffer[..self.capacity], self.size);
            if next(input, &mut hold)? {
                self.end_was_reached = true;
            }
            self.size = hold.position();

            self.filtered = Self::convert(&mut self.filter, &mut self.now_pos, &mut self.buffer[..self.size]);
            if self.end_was_reached {
                self.filtered = self.size;
            }
            self.pos += out.write(&self.buffer[self.pos..self.filtered]);
        }

        Ok(self.end_was_reached && self.pos == self.size)
    }

    fn convert(filter: &mut SimpleFilter, now_pos: &mut u32, buf: &mut [u8]) -> usize {
        let done = filter.apply(*now_pos, buf);
        *now_pos = now_pos.wrapping_add(done as u32);
        done
    }
}

/// A block's complete decoding chain.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Outermost first.
    stages: Vec<SimpleStage>,
    lzma2: Lzma2Decoder,
    finished: bool,
}

impl Pipeline {
    /// Returns the memory a chain needs while decoding.
    pub fn memory_usage(filters: &[Filter]) -> u64 {
        filters.iter().map(Filter::memory_usage).sum()
    }

    /// Builds the chain, placing the LZMA2 dictionary in `spare`'s allocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOptions`] for an invalid chain and
    /// [`Error::OutOfMemory`] if the dictionary cannot be allocated.
    pub fn new(filters: &[Filter], spare: Vec<u8>) -> Result<Self> {
        validate_chain(filters)?;

        let mut stages = Vec::with_capacity(filters.len() - 1);
        let mut lzma2 = None;
        for filter in filters {
            match *filter {
                Filter::Lzma2 { dict_size } => {
                    lzma2 = Some(Lzma2Decoder::new(dict_size, spare)?);
                    break;
                }
                Filter::Delta { distance } => {
                    stages.push(SimpleStage::new(SimpleFilter::delta(distance as usize), 0));
                }
                Filter::Bcj { arch, start_offset } => {
                    stages.push(SimpleStage::new(SimpleFilter::bcj(arch), start_offset));
                }
            }
        }

        let lzma2 = lzma2.ok_or(Error::ProgError("validated chain has no LZMA2 filter"))?;
        Ok(Self {
            stages,
            lzma2,
            finished: false,
        })
    }

    /// Gives back the dictionary allocation.
    pub fn into_buffer(self) -> Vec<u8> {
        self.lzma2.into_buffer()
    }

    /// Decodes as much as the two windows allow.
    ///
    /// Returns `true` once the LZMA2 end marker has been read and every
    /// byte has passed through the outer stages.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::Corrupt`] from the LZMA2 decoder.
    pub fn decode(&mut self, input: &mut InputCursor<'_>, out: &mut OutputCursor<'_>) -> Result<bool> {
        if self.finished {
            return Ok(true);
        }
        self.finished = run_chain(&mut self.stages, &mut self.lzma2, input, out)?;
        Ok(self.finished)
    }
}

fn run_chain(
    stages: &mut [SimpleStage],
    lzma2: &mut Lzma2Decoder,
    input: &mut InputCursor<'_>,
    out: &mut OutputCursor<'_>,
) -> Result<bool> {
    match stages.split_first_mut() {
        None => lzma2.decode(input, out),
        Some((stage, rest)) => stage.code(
            input,
            out,
            |input: &mut InputCursor<'_>, out: &mut OutputCursor<'_>| {
                run_chain(rest, lzma2, input, out)
            },
        ),
    }
}
