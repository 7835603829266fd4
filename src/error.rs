//! Error types for xz decoding.
//!
//! This module provides the [`Error`] enum which represents every condition
//! that stops [`StreamDecoder::decode`] short of producing more data, along
//! with a convenient [`Result<T>`] type alias.
//!
//! # Error Classes
//!
//! Errors fall into three classes, mirrored by [`ErrorKind`]:
//!
//! | Class | Variants | Recovery |
//! |-------|----------|----------|
//! | Input shape | [`Format`][Error::Format], [`UnsupportedOptions`][Error::UnsupportedOptions], [`Corrupt`][Error::Corrupt], [`CheckMismatch`][Error::CheckMismatch], [`Truncated`][Error::Truncated] | Abandon the session |
//! | Resources | [`MemoryLimitExceeded`][Error::MemoryLimitExceeded], [`OutOfMemory`][Error::OutOfMemory] | Raise the limit or abandon |
//! | Contract | [`ProgError`][Error::ProgError] | A bug in the caller or the engine |
//!
//! ```rust
//! use xzstream::{Error, ErrorKind};
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error.kind() {
//!         ErrorKind::Format => "not an .xz file",
//!         ErrorKind::DataCorrupt => "the file is damaged",
//!         ErrorKind::MemoryLimitExceeded => "the file needs more memory than allowed",
//!         ErrorKind::ProgError => "decoder misuse",
//!         _ => "decoding failed",
//!     }
//! }
//! ```
//!
//! [`StreamDecoder::decode`]: crate::StreamDecoder::decode

use std::io;

use crate::format::check::CheckKind;

/// Coarse classification of an [`Error`].
///
/// These correspond one-to-one with the terminal statuses of a decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input does not start with an .xz stream header.
    Format,
    /// The input uses a filter, flag or check layout this decoder does not support.
    OptionsUnsupported,
    /// The input is damaged (bad header CRC, bad sizes, failed integrity check).
    DataCorrupt,
    /// The input ended while [`Action::Finish`](crate::Action::Finish) was asserted.
    BufferError,
    /// A block needs more memory than the configured ceiling.
    MemoryLimitExceeded,
    /// An allocation for the decoder's own state failed.
    OutOfMemory,
    /// The caller broke the calling contract or an internal invariant failed.
    ProgError,
    /// An I/O error from the reader adapter.
    Io,
}

/// The error type for xz decoding.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error from the underlying reader of [`XzReader`](crate::XzReader).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not an .xz stream.
    ///
    /// Returned only for the first stream of a session. A bad magic in a
    /// later concatenated stream is reported as [`Error::Corrupt`].
    #[error("Invalid xz format: {0}")]
    Format(String),

    /// The stream uses options this decoder does not implement.
    ///
    /// Reserved header bits, unknown filter IDs, and invalid filter chains
    /// end up here.
    #[error("Unsupported options: {0}")]
    UnsupportedOptions(String),

    /// The compressed data is corrupt.
    #[error("Corrupt data at offset {offset:#x}: {reason}")]
    Corrupt {
        /// Input offset (counted over the whole session) where the problem was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The integrity check stored after a block does not match the decoded data.
    #[error("{kind} mismatch in block {block}: expected {expected}, got {actual}")]
    CheckMismatch {
        /// The check type declared in the stream header.
        kind: CheckKind,
        /// Zero-based block number within the current stream.
        block: u64,
        /// The stored value, as lowercase hex.
        expected: String,
        /// The computed value, as lowercase hex.
        actual: String,
    },

    /// The input ended in the middle of a stream while finishing was requested.
    #[error("Truncated input: {0}")]
    Truncated(&'static str),

    /// Decoding the next block needs more memory than the configured limit.
    ///
    /// This is the only resumable error: raise the limit with
    /// [`StreamDecoder::set_memory_limit`](crate::StreamDecoder::set_memory_limit)
    /// and call `decode` again to continue.
    #[error("Memory limit exceeded: need {required} bytes (limit: {limit} bytes)")]
    MemoryLimitExceeded {
        /// Total bytes the session would hold with the next block's filters.
        required: u64,
        /// The configured ceiling.
        limit: u64,
    },

    /// An allocation for decoder state failed.
    #[error("Out of memory: failed to allocate {requested} bytes")]
    OutOfMemory {
        /// The allocation size that failed.
        requested: usize,
    },

    /// The caller violated the calling contract or an internal invariant broke.
    ///
    /// This never results from malformed input. Treat it as a bug.
    #[error("Programming error: {0}")]
    ProgError(&'static str),
}

impl Error {
    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Format(_) => ErrorKind::Format,
            Error::UnsupportedOptions(_) => ErrorKind::OptionsUnsupported,
            Error::Corrupt { .. } | Error::CheckMismatch { .. } => ErrorKind::DataCorrupt,
            Error::Truncated(_) => ErrorKind::BufferError,
            Error::MemoryLimitExceeded { .. } => ErrorKind::MemoryLimitExceeded,
            Error::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Error::ProgError(_) => ErrorKind::ProgError,
        }
    }

    /// Returns `true` if this is a data corruption error.
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::DataCorrupt
    }

    /// Returns `true` if the input uses features this build cannot decode.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedOptions(_))
    }

    /// Returns `true` if the session can continue after this error.
    ///
    /// Only [`Error::MemoryLimitExceeded`] qualifies, and only once the
    /// limit has been raised.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MemoryLimitExceeded { .. })
    }

    /// Returns `true` if this error signals a bug rather than bad input.
    ///
    /// Fuzz harnesses abort on this and ignore everything else.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::ProgError(_))
    }

    /// Creates a Corrupt error.
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    /// Fills in the input offset of a Corrupt error raised below the container layer.
    pub(crate) fn with_offset(self, at: u64) -> Self {
        match self {
            Error::Corrupt { offset: 0, reason } => Error::Corrupt { offset: at, reason },
            other => other,
        }
    }

    /// Creates an UnsupportedOptions error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Error::UnsupportedOptions(reason.into())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::Format | ErrorKind::DataCorrupt => io::ErrorKind::InvalidData,
            ErrorKind::BufferError => io::ErrorKind::UnexpectedEof,
            ErrorKind::OptionsUnsupported => io::ErrorKind::Unsupported,
            ErrorKind::MemoryLimitExceeded | ErrorKind::OutOfMemory => io::ErrorKind::OutOfMemory,
            ErrorKind::Io | ErrorKind::ProgError => io::ErrorKind::Other,
        };
        match err {
            Error::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}

/// A specialized Result type for xz decoding.
pub type Result<T> = std::result::Result<T, Error>;
