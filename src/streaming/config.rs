//! Configuration for decode sessions.
//!
//! This module provides [`DecoderConfig`] for controlling the memory ceiling
//! and the container-level behavior of a [`StreamDecoder`](crate::StreamDecoder).

use super::DEFAULT_MEMORY_LIMIT;

/// Configuration for a decode session.
///
/// # Example
///
/// ```rust
/// use xzstream::DecoderConfig;
///
/// // Default configuration (128 MiB ceiling, single stream, checks verified)
/// let config = DecoderConfig::default();
///
/// // Decode `xz`-style concatenated files with a tighter ceiling
/// let config = DecoderConfig::new()
///     .memory_limit(16 * 1024 * 1024) // 16 MiB
///     .concatenated(true);
/// assert!(config.concatenated);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Ceiling for memory reserved by the filters of a block (bytes).
    ///
    /// A block whose dictionary would push the total past this value stops
    /// decoding with [`Error::MemoryLimitExceeded`](crate::Error::MemoryLimitExceeded).
    /// Zero is treated as one byte.
    /// Default: 128 MiB.
    pub memory_limit: u64,

    /// Decode concatenated streams.
    ///
    /// When disabled, decoding stops after the first stream and any bytes
    /// after its footer stay unconsumed in the input cursor;
    /// [`decompress`](super::decompress) and [`XzReader`](super::XzReader)
    /// report them as corrupt data. When enabled, stream padding and
    /// further streams are decoded until the input ends.
    /// Default: false.
    pub concatenated: bool,

    /// Compute but do not enforce the integrity check of each block.
    ///
    /// Header CRC32 values are still verified.
    /// Default: false.
    pub ignore_check: bool,

    /// Return [`Status::NoCheck`](crate::Status::NoCheck) once after a
    /// stream header that declares no integrity check.
    /// Default: false.
    pub tell_no_check: bool,

    /// Return [`Status::UnsupportedCheck`](crate::Status::UnsupportedCheck)
    /// once after a stream header whose check cannot be computed.
    /// Default: false.
    pub tell_unsupported_check: bool,

    /// Return [`Status::GetCheck`](crate::Status::GetCheck) once after every
    /// stream header, whatever the check type.
    /// Default: false.
    pub tell_any_check: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            concatenated: false,
            ignore_check: false,
            tell_no_check: false,
            tell_unsupported_check: false,
            tell_any_check: false,
        }
    }
}

impl DecoderConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the configuration used by the fuzz targets.
    ///
    /// 300 MiB ceiling, concatenated streams, integrity checks ignored so
    /// that corrupted check values don't stop the decoder early.
    pub fn fuzzing() -> Self {
        Self {
            memory_limit: 300 << 20,
            concatenated: true,
            ignore_check: true,
            ..Self::default()
        }
    }

    /// Creates a configuration without a memory ceiling.
    ///
    /// Only use this for trusted input: a block header can ask for a 4 GiB
    /// dictionary.
    pub fn unlimited() -> Self {
        Self {
            memory_limit: u64::MAX,
            ..Self::default()
        }
    }

    /// Sets the memory ceiling.
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Sets whether to decode concatenated streams.
    pub fn concatenated(mut self, enabled: bool) -> Self {
        self.concatenated = enabled;
        self
    }

    /// Sets whether to ignore block integrity checks.
    pub fn ignore_check(mut self, ignore: bool) -> Self {
        self.ignore_check = ignore;
        self
    }

    /// Sets whether to report streams without an integrity check.
    pub fn tell_no_check(mut self, tell: bool) -> Self {
        self.tell_no_check = tell;
        self
    }

    /// Sets whether to report streams with an unsupported integrity check.
    pub fn tell_unsupported_check(mut self, tell: bool) -> Self {
        self.tell_unsupported_check = tell;
        self
    }

    /// Sets whether to report the check type of every stream.
    pub fn tell_any_check(mut self, tell: bool) -> Self {
        self.tell_any_check = tell;
        self
    }
}
