//! # xzstream
//!
//! An incremental, bounded-memory decoder for the `.xz` container format.
//!
//! The decoder consumes input in windows of any size, down to one byte,
//! and writes output into windows of any size. It never buffers more than a
//! block header of input, and the memory it spends on a block's dictionary
//! is checked against a caller-provided ceiling before it is allocated.
//!
//! ## Quick Start
//!
//! ### Decompressing a File in Memory
//!
//! ```rust,no_run
//! use xzstream::{DecoderConfig, Result, decompress};
//!
//! fn main() -> Result<()> {
//!     let compressed = std::fs::read("data.xz")?;
//!     let plain = decompress(&compressed, &DecoderConfig::default())?;
//!     println!("{} bytes", plain.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Reading Through `std::io::Read`
//!
//! ```rust,no_run
//! use std::io::{self, BufReader};
//! use xzstream::{DecoderConfig, Result, XzReader};
//!
//! fn main() -> Result<()> {
//!     let file = BufReader::new(std::fs::File::open("logs.xz")?);
//!     let config = DecoderConfig::new().concatenated(true);
//!     let mut reader = XzReader::new(file, config)?;
//!     io::copy(&mut reader, &mut io::stdout())?;
//!     Ok(())
//! }
//! ```
//!
//! ### Driving the Decoder Directly
//!
//! [`StreamDecoder`] is a push-style state machine. Each call advances an
//! [`InputCursor`] and an [`OutputCursor`] and returns a [`Status`]:
//!
//! ```rust,no_run
//! use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};
//!
//! fn decode(chunks: &[&[u8]]) -> xzstream::Result<Vec<u8>> {
//!     let mut decoder = StreamDecoder::new(DecoderConfig::default())?;
//!     let mut plain = Vec::new();
//!     let mut buf = [0u8; 4096];
//!
//!     for (i, chunk) in chunks.iter().enumerate() {
//!         let action = if i + 1 == chunks.len() { Action::Finish } else { Action::Run };
//!         let mut input = InputCursor::new(chunk);
//!         loop {
//!             let mut output = OutputCursor::new(&mut buf);
//!             let status = decoder.decode(&mut input, &mut output, action)?;
//!             plain.extend_from_slice(output.filled());
//!             match status {
//!                 Status::StreamEnd => return Ok(plain),
//!                 Status::NeedMoreInput => break,
//!                 _ => {}
//!             }
//!         }
//!     }
//!     Ok(plain)
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Only
//! [`Error::MemoryLimitExceeded`] leaves the session usable:
//!
//! ```rust,no_run
//! use xzstream::{Action, DecoderConfig, Error, InputCursor, OutputCursor, StreamDecoder};
//!
//! # fn main() -> xzstream::Result<()> {
//! # let data = Vec::new();
//! let mut decoder = StreamDecoder::new(DecoderConfig::new().memory_limit(1 << 20))?;
//! let mut input = InputCursor::new(&data);
//! let mut buf = [0u8; 4096];
//! let mut output = OutputCursor::new(&mut buf);
//!
//! match decoder.decode(&mut input, &mut output, Action::Finish) {
//!     Err(Error::MemoryLimitExceeded { required, .. }) => {
//!         decoder.set_memory_limit(required)?;
//!         decoder.decode(&mut input, &mut output, Action::Finish)?;
//!     }
//!     other => {
//!         other?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Supported Filters
//!
//! | Filter | ID | Notes |
//! |--------|----|-------|
//! | LZMA2 | `0x21` | Last filter of every chain |
//! | Delta | `0x03` | Distance 1 to 256 |
//! | BCJ x86, PowerPC, IA-64, ARM, ARM-Thumb, SPARC, ARM64 | `0x04`..`0x0A` | Optional start offset |
//!
//! Integrity checks: none, CRC32, CRC64, and SHA-256 (feature `sha256`,
//! enabled by default). Streams with other check IDs decode, but their
//! checks are skipped.
//!
//! ## Logging
//!
//! Stream and block boundaries are logged at `debug` level through the
//! [`log`](https://docs.rs/log) facade; memory limit refusals and
//! unverifiable checks at `warn`. The crate installs no logger.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod streaming;

pub use error::{Error, ErrorKind, Result};
pub use format::check::CheckKind;

// Re-export the decoding API at crate root for convenience
pub use streaming::{
    Action, DecoderConfig, InputCursor, MemoryLimiter, OutputCursor, Status, StreamDecoder,
    XzReader, decompress,
};
