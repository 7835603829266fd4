//! The push-style decode session.
//!
//! [`StreamDecoder`] drives a [`StreamParser`] over caller-owned windows.
//! On top of the single-stream parser it handles stream padding and
//! concatenated streams, turns parser suspensions into a [`Status`],
//! enforces the calling contract, and accounts filter memory.

use crate::format::check::CheckKind;
use crate::format::stream::{Progress, StreamParser};
use crate::{Error, Result};

use super::{DecoderConfig, InputCursor, MemoryLimiter, OutputCursor};

/// What the caller intends with a [`decode`](StreamDecoder::decode) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// More input may follow.
    Run,
    /// The input window holds the rest of the file.
    ///
    /// Running out of input before the end of a stream is reported as
    /// [`Error::Truncated`]. Once a call passes `Finish`, every later call
    /// must pass `Finish` with the input left over by the previous call.
    Finish,
}

/// Why a [`decode`](StreamDecoder::decode) call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// A block was completed; call again to continue.
    Ok,
    /// A stream footer was verified, or the end of the input was confirmed.
    ///
    /// Every stream footer is reported once. With concatenation disabled,
    /// the decoder is finished and later calls return `StreamEnd` without
    /// consuming input.
    ///
    /// With concatenation enabled, call again to look for stream padding or
    /// another stream. A call with [`Action::Finish`] that reaches the end
    /// of the input after a footer checks the padding and returns
    /// `StreamEnd` again. This confirmation does not belong to a new stream:
    /// it follows the footer's own `StreamEnd` whenever the footer was
    /// decoded under [`Action::Run`], or trailing padding followed it.
    /// Under `Finish`, a footer that ends the input is reported only once.
    StreamEnd,
    /// The input window is exhausted.
    NeedMoreInput,
    /// The output window is full.
    OutputFull,
    /// The stream header declares no integrity check.
    ///
    /// Only reported when [`DecoderConfig::tell_no_check`] is set.
    NoCheck,
    /// The stream's integrity check cannot be computed by this build.
    ///
    /// Only reported when [`DecoderConfig::tell_unsupported_check`] is set.
    UnsupportedCheck,
    /// The stream header was read; [`StreamDecoder::check_kind`] is available.
    ///
    /// Only reported when [`DecoderConfig::tell_any_check`] is set.
    GetCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outer {
    /// Inside a stream.
    Stream,
    /// After a footer, skipping zero bytes before the next stream.
    Padding,
    /// The single stream has ended.
    Finished,
    /// A fatal error was returned.
    Failed,
    /// [`StreamDecoder::end`] was called.
    Ended,
}

/// An incremental .xz decoder.
///
/// Created with [`new`](Self::new), advanced with [`decode`](Self::decode),
/// torn down with [`end`](Self::end) or by dropping it. The decoder never
/// holds on to the caller's buffers between calls, and its only growing
/// allocation is the dictionary of the block being decoded, which is
/// bounded by the memory limit.
///
/// The session can be cloned between calls to snapshot its progress.
///
/// # Example
///
/// ```rust
/// use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};
///
/// # fn main() -> xzstream::Result<()> {
/// // An empty .xz stream.
/// let data = [
///     0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x04, 0xE6, 0xD6, 0xB4, 0x46,
///     0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21, 0x1F, 0xB6, 0xF3, 0x7D,
///     0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0x59, 0x5A,
/// ];
/// let mut decoder = StreamDecoder::new(DecoderConfig::default())?;
/// let mut input = InputCursor::new(&data);
/// let mut buf = [0u8; 16];
/// let mut output = OutputCursor::new(&mut buf);
///
/// let status = decoder.decode(&mut input, &mut output, Action::Finish)?;
/// assert_eq!(status, Status::StreamEnd);
/// assert!(input.is_empty());
/// assert_eq!(decoder.total_in(), 32);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    config: DecoderConfig,
    outer: Outer,
    parser: StreamParser,
    limiter: MemoryLimiter,
    /// Zero bytes seen since the last footer.
    padding: u64,
    /// Input left over by the last call that passed [`Action::Finish`].
    finish_len: Option<usize>,
    total_in: u64,
    total_out: u64,
    streams: u64,
}

impl StreamDecoder {
    /// Creates a decoder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the header buffer cannot be allocated.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        let parser = StreamParser::new(config.ignore_check)?;
        let limiter = MemoryLimiter::new(config.memory_limit);
        Ok(Self {
            config,
            outer: Outer::Stream,
            parser,
            limiter,
            padding: 0,
            finish_len: None,
            total_in: 0,
            total_out: 0,
            streams: 0,
        })
    }

    /// Decodes as much as the windows allow.
    ///
    /// Consumes from `input`, writes into `output`, and returns at the first
    /// of: a completed block, a stream footer, an exhausted window, or a
    /// check report requested by the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Format`] if the input is not an .xz file
    /// - [`Error::UnsupportedOptions`] for unsupported filters or flags
    /// - [`Error::Corrupt`] or [`Error::CheckMismatch`] for damaged input
    /// - [`Error::Truncated`] if the input ends early under [`Action::Finish`]
    /// - [`Error::MemoryLimitExceeded`] if the next block needs more memory
    ///   than allowed. The block has not been started; raise the limit with
    ///   [`set_memory_limit`](Self::set_memory_limit) and call again.
    /// - [`Error::ProgError`] if the calling contract is broken
    ///
    /// Every error except `MemoryLimitExceeded` is final: later calls
    /// return [`Error::ProgError`].
    pub fn decode(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
        action: Action,
    ) -> Result<Status> {
        match self.outer {
            Outer::Failed => return Err(Error::ProgError("decode called after a fatal error")),
            Outer::Ended => return Err(Error::ProgError("decode called after end")),
            _ => {}
        }
        if let Some(expected) = self.finish_len {
            if action != Action::Finish || input.len() != expected {
                self.fail();
                return Err(Error::ProgError("input changed after Action::Finish"));
            }
        }

        let in_start = input.position();
        let out_start = output.position();
        let result = self.step(input, output, action);
        self.total_in += (input.position() - in_start) as u64;
        self.total_out += (output.position() - out_start) as u64;
        if action == Action::Finish {
            self.finish_len = Some(input.len());
        }

        result.map_err(|err| {
            if !err.is_recoverable() {
                self.fail();
            }
            err.with_offset(self.total_in)
        })
    }

    fn step(
        &mut self,
        input: &mut InputCursor<'_>,
        output: &mut OutputCursor<'_>,
        action: Action,
    ) -> Result<Status> {
        loop {
            match self.outer {
                Outer::Stream => match self.parser.decode(input, output, &mut self.limiter)? {
                    Progress::StreamHeader(kind) => {
                        if let Some(status) = self.tell(kind) {
                            return Ok(status);
                        }
                    }
                    Progress::BlockDone => return Ok(Status::Ok),
                    Progress::StreamEnd => {
                        self.streams += 1;
                        self.outer = if self.config.concatenated {
                            self.padding = 0;
                            Outer::Padding
                        } else {
                            Outer::Finished
                        };
                        return Ok(Status::StreamEnd);
                    }
                    Progress::Suspended => return self.suspended(input, output, action),
                },
                Outer::Padding => {
                    let zeros = input.remaining().iter().take_while(|&&b| b == 0x00).count();
                    input.advance(zeros);
                    self.padding += zeros as u64;

                    if input.is_empty() {
                        if action == Action::Run {
                            return Ok(Status::NeedMoreInput);
                        }
                        self.check_padding()?;
                        return Ok(Status::StreamEnd);
                    }
                    self.check_padding()?;
                    log::debug!("stream padding: {} bytes", self.padding);
                    self.parser.next_stream(&mut self.limiter);
                    self.outer = Outer::Stream;
                }
                Outer::Finished => return Ok(Status::StreamEnd),
                Outer::Failed | Outer::Ended => {
                    return Err(Error::ProgError("decoder is no longer usable"));
                }
            }
        }
    }

    fn check_padding(&self) -> Result<()> {
        if self.padding % 4 != 0 {
            return Err(Error::corrupt(
                0,
                format!("stream padding of {} bytes is not a multiple of four", self.padding),
            ));
        }
        Ok(())
    }

    fn tell(&self, kind: CheckKind) -> Option<Status> {
        if self.config.tell_no_check && kind == CheckKind::None {
            Some(Status::NoCheck)
        } else if self.config.tell_unsupported_check && !kind.is_supported() {
            Some(Status::UnsupportedCheck)
        } else if self.config.tell_any_check {
            Some(Status::GetCheck)
        } else {
            None
        }
    }

    fn suspended(
        &self,
        input: &InputCursor<'_>,
        output: &OutputCursor<'_>,
        action: Action,
    ) -> Result<Status> {
        if output.is_full() {
            Ok(Status::OutputFull)
        } else if !input.is_empty() {
            Err(Error::ProgError("decoder stopped with input and output space left"))
        } else if action == Action::Finish {
            Err(Error::Truncated(self.parser.position_name()))
        } else {
            Ok(Status::NeedMoreInput)
        }
    }

    fn fail(&mut self) {
        self.parser.release(&mut self.limiter);
        self.outer = Outer::Failed;
    }

    /// Releases the block in progress and every buffer the session owns.
    ///
    /// Safe to call more than once; also runs on drop. Later calls to
    /// [`decode`](Self::decode) return [`Error::ProgError`].
    pub fn end(&mut self) {
        if self.outer == Outer::Ended {
            return;
        }
        self.parser.release(&mut self.limiter);
        self.parser.free_buffers();
        self.limiter.release_all();
        self.outer = Outer::Ended;
    }

    /// Starts a new session with `config`, reusing the allocated buffers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the session had been ended and its
    /// header buffer cannot be allocated again.
    pub fn reset(&mut self, config: DecoderConfig) -> Result<()> {
        if self.outer == Outer::Ended {
            self.parser = StreamParser::new(config.ignore_check)?;
        } else {
            self.parser.reset(config.ignore_check, &mut self.limiter);
        }
        self.limiter = MemoryLimiter::new(config.memory_limit);
        self.config = config;
        self.outer = Outer::Stream;
        self.padding = 0;
        self.finish_len = None;
        self.total_in = 0;
        self.total_out = 0;
        self.streams = 0;
        Ok(())
    }

    /// Returns the memory currently reserved by the active block's filters.
    pub fn memory_usage(&self) -> u64 {
        self.limiter.current_usage()
    }

    /// Returns the memory ceiling.
    pub fn memory_limit(&self) -> u64 {
        self.limiter.limit()
    }

    /// Changes the memory ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryLimitExceeded`] if more than `limit` bytes are
    /// already in use.
    pub fn set_memory_limit(&mut self, limit: u64) -> Result<()> {
        self.limiter.set_limit(limit)?;
        self.config.memory_limit = self.limiter.limit();
        self.parser.shrink_to_limit(self.limiter.limit());
        Ok(())
    }

    /// Returns the check type of the current stream, once its header has been read.
    pub fn check_kind(&self) -> Option<CheckKind> {
        self.parser.check_kind()
    }

    /// Returns the number of input bytes consumed over the whole session.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Returns the number of bytes produced over the whole session.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Returns the number of stream footers verified.
    pub fn streams_decoded(&self) -> u64 {
        self.streams
    }

    /// Returns the session's configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        self.end();
    }
}
