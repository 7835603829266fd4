//! Pull-style adapters over [`StreamDecoder`].

use std::io::{self, Read};

use crate::{Error, Result};

use super::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};

/// Default size of the compressed-input buffer of [`XzReader`].
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Output chunk size used by [`decompress`].
const DECOMPRESS_CHUNK: usize = 64 * 1024;

/// Decompresses a complete `.xz` file held in memory.
///
/// With [`DecoderConfig::concatenated`] unset, `data` must hold exactly one
/// stream. To decode a stream followed by unrelated bytes, drive a
/// [`StreamDecoder`] directly: it leaves the rest in the input cursor.
///
/// # Errors
///
/// Returns any error of [`StreamDecoder::decode`], and [`Error::Corrupt`]
/// if bytes follow a single stream. A memory limit refusal is returned as
/// is; this function does not retry.
///
/// # Example
///
/// ```rust
/// use xzstream::{DecoderConfig, decompress};
///
/// let empty = [
///     0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x04, 0xE6, 0xD6, 0xB4, 0x46,
///     0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21, 0x1F, 0xB6, 0xF3, 0x7D,
///     0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0x59, 0x5A,
/// ];
/// assert!(decompress(&empty, &DecoderConfig::default())?.is_empty());
/// # Ok::<(), xzstream::Error>(())
/// ```
pub fn decompress(data: &[u8], config: &DecoderConfig) -> Result<Vec<u8>> {
    let mut decoder = StreamDecoder::new(config.clone())?;
    let mut input = InputCursor::new(data);
    let mut plain = Vec::new();
    let mut chunk = vec![0u8; DECOMPRESS_CHUNK];

    loop {
        let mut output = OutputCursor::new(&mut chunk);
        let status = decoder.decode(&mut input, &mut output, Action::Finish)?;
        plain.extend_from_slice(output.filled());
        if status == Status::StreamEnd && (!config.concatenated || input.is_empty()) {
            if !input.is_empty() {
                return Err(trailing_data(decoder.total_in()));
            }
            return Ok(plain);
        }
    }
}

fn trailing_data(offset: u64) -> Error {
    Error::corrupt(offset, "trailing data after stream")
}

/// Decompressing [`Read`] adapter.
///
/// Pulls compressed bytes from the inner reader on demand and feeds them
/// through a [`StreamDecoder`]. Returns `Ok(0)` once the last stream has
/// ended. With [`DecoderConfig::concatenated`] unset, bytes after the
/// stream fail the read with [`io::ErrorKind::InvalidData`].
///
/// # Example
///
/// ```rust,no_run
/// use std::fs::File;
/// use std::io::Read;
/// use xzstream::{DecoderConfig, XzReader};
///
/// # fn main() -> xzstream::Result<()> {
/// let file = File::open("data.xz")?;
/// let mut reader = XzReader::new(file, DecoderConfig::new().concatenated(true))?;
/// let mut text = String::new();
/// reader.read_to_string(&mut text)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct XzReader<R> {
    inner: R,
    decoder: StreamDecoder,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
    eof: bool,
    done: bool,
}

impl<R: Read> XzReader<R> {
    /// Wraps `inner` with the default input buffer size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the decoder cannot be created.
    pub fn new(inner: R, config: DecoderConfig) -> Result<Self> {
        Self::with_capacity(inner, config, READ_BUFFER_SIZE)
    }

    /// Wraps `inner`, reading compressed data `capacity` bytes at a time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the decoder or the buffer cannot be
    /// allocated, and [`Error::ProgError`] for a zero capacity.
    pub fn with_capacity(inner: R, config: DecoderConfig, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ProgError("read buffer capacity must be non-zero"));
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory { requested: capacity })?;
        buf.resize(capacity, 0);
        Ok(Self {
            inner,
            decoder: StreamDecoder::new(config)?,
            buf,
            pos: 0,
            filled: 0,
            eof: false,
            done: false,
        })
    }

    /// Returns the underlying decoder, for progress counters and check types.
    pub fn decoder(&self) -> &StreamDecoder {
        &self.decoder
    }

    /// Changes the decoder's memory ceiling.
    ///
    /// Use this after a read failed with [`io::ErrorKind::OutOfMemory`] to
    /// let the next read continue.
    ///
    /// # Errors
    ///
    /// See [`StreamDecoder::set_memory_limit`].
    pub fn set_memory_limit(&mut self, limit: u64) -> Result<()> {
        self.decoder.set_memory_limit(limit)
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwraps the adapter, returning the inner reader.
    ///
    /// Compressed bytes that were buffered but not decoded are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn refill(&mut self) -> io::Result<()> {
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(n) => {
                    self.pos = 0;
                    self.filled = n;
                    self.eof = n == 0;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Makes sure nothing follows a single stream.
    fn check_trailing(&mut self) -> io::Result<()> {
        if self.decoder.config().concatenated {
            return Ok(());
        }
        if self.pos == self.filled && !self.eof {
            self.refill()?;
        }
        if self.pos < self.filled {
            return Err(trailing_data(self.decoder.total_in()).into());
        }
        Ok(())
    }
}

impl<R: Read> Read for XzReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return self.check_trailing().map(|()| 0);
        }
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos == self.filled && !self.eof {
                self.refill()?;
            }
            let action = if self.eof { Action::Finish } else { Action::Run };

            let mut input = InputCursor::new(&self.buf[self.pos..self.filled]);
            let mut output = OutputCursor::new(out);
            let result = self.decoder.decode(&mut input, &mut output, action);
            // Input consumed before an error is not handed out again.
            self.pos += input.position();
            let status = result?;
            let produced = output.position();

            if status == Status::StreamEnd
                && (!self.decoder.config().concatenated || (self.eof && self.pos == self.filled))
            {
                self.done = true;
                if produced == 0 {
                    return self.check_trailing().map(|()| 0);
                }
            }
            if produced > 0 {
                return Ok(produced);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_STREAM: [u8; 32] = [
        0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x04, 0xE6, 0xD6, 0xB4, 0x46, 0x00, 0x00, 0x00,
        0x00, 0x1C, 0xDF, 0x44, 0x21, 0x1F, 0xB6, 0xF3, 0x7D, 0x01, 0x00, 0x00, 0x00, 0x00, 0x04,
        0x59, 0x5A,
    ];

    /// Reader that returns one byte per call and an interruption in between.
    struct Trickle<'a> {
        data: &'a [u8],
        interrupt: bool,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "again"));
            }
            let Some((&first, rest)) = self.data.split_first() else {
                return Ok(0);
            };
            buf[0] = first;
            self.data = rest;
            Ok(1)
        }
    }

    #[test]
    fn test_decompress_concatenated_empty_streams() {
        let mut data = EMPTY_STREAM.to_vec();
        data.extend_from_slice(&EMPTY_STREAM);
        let config = DecoderConfig::new().concatenated(true);
        assert!(decompress(&data, &config).unwrap().is_empty());
    }

    #[test]
    fn test_decompress_rejects_trailing_data() {
        let mut data = EMPTY_STREAM.to_vec();
        data.extend_from_slice(b"GARBAGE");
        match decompress(&data, &DecoderConfig::default()) {
            Err(Error::Corrupt { offset, reason }) => {
                assert_eq!(offset, 32);
                assert!(reason.contains("trailing"));
            }
            other => panic!("expected trailing data error, got {:?}", other),
        }
    }

    #[test]
    fn test_reader_rejects_trailing_data_after_output() {
        let mut data = EMPTY_STREAM.to_vec();
        data.push(0x00);
        let trickle = Trickle {
            data: &data,
            interrupt: false,
        };
        let mut reader = XzReader::new(trickle, DecoderConfig::default()).unwrap();
        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        // The error persists.
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn test_decompress_truncated() {
        let err = decompress(&EMPTY_STREAM[..20], &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)));
    }

    #[test]
    fn test_reader_trickle() {
        let mut data = EMPTY_STREAM.to_vec();
        data.extend_from_slice(&[0x00; 4]);
        data.extend_from_slice(&EMPTY_STREAM);
        let trickle = Trickle {
            data: &data,
            interrupt: false,
        };
        let mut reader = XzReader::new(trickle, DecoderConfig::new().concatenated(true)).unwrap();
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).unwrap(), 0);
        assert_eq!(reader.decoder().streams_decoded(), 2);
        assert_eq!(reader.decoder().total_in(), data.len() as u64);
    }

    #[test]
    fn test_reader_reports_invalid_data() {
        let mut data = EMPTY_STREAM;
        data[0] = 0x00;
        let mut reader = XzReader::new(&data[..], DecoderConfig::default()).unwrap();
        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(XzReader::with_capacity(&EMPTY_STREAM[..], DecoderConfig::default(), 0).is_err());
    }
}
