//! Incremental decoding API with bounded memory.
//!
//! This module provides the push-style decoder and its supporting types.
//! The caller owns every buffer: each call to [`StreamDecoder::decode`]
//! borrows an input window and an output window, advances them, and
//! reports what stopped it.
//!
//! # Overview
//!
//! - **[`StreamDecoder`]**: The session state machine
//! - **[`DecoderConfig`]**: Memory ceiling and container behavior
//! - **[`InputCursor`] / [`OutputCursor`]**: Caller-owned windows
//! - **[`MemoryLimiter`]**: Accounting for filter memory
//! - **[`XzReader`]**: [`std::io::Read`] adapter over any reader
//!
//! # Example
//!
//! ```rust,no_run
//! use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};
//!
//! # fn main() -> xzstream::Result<()> {
//! let compressed = std::fs::read("data.xz")?;
//! let mut decoder = StreamDecoder::new(DecoderConfig::default())?;
//! let mut input = InputCursor::new(&compressed);
//! let mut buf = [0u8; 8192];
//! let mut plain = Vec::new();
//!
//! loop {
//!     let mut output = OutputCursor::new(&mut buf);
//!     let status = decoder.decode(&mut input, &mut output, Action::Finish)?;
//!     plain.extend_from_slice(output.filled());
//!     if status == Status::StreamEnd {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Memory Management
//!
//! Only the filters of the block being decoded count against the ceiling.
//! When a block needs more, `decode` returns
//! [`Error::MemoryLimitExceeded`](crate::Error::MemoryLimitExceeded) without
//! consuming the block's data; raise the ceiling with
//! [`StreamDecoder::set_memory_limit`] and call `decode` again.

mod config;
mod cursor;
mod decoder;
mod memory;
mod reader;

pub use config::DecoderConfig;
pub use cursor::{InputCursor, OutputCursor};
pub use decoder::{Action, Status, StreamDecoder};
pub use memory::MemoryLimiter;
pub use reader::{XzReader, decompress};

/// Default ceiling for filter memory: 128 MiB.
pub const DEFAULT_MEMORY_LIMIT: u64 = 128 * 1024 * 1024;
