//! .xz container format constants, structures, and incremental parsing.
//!
//! A `.xz` file is one or more streams, optionally separated by stream
//! padding (zero bytes in multiples of four):
//!
//! ```text
//! +---------------+---------+-----+---------+-------+---------------+
//! | Stream Header | Block 0 | ... | Block N | Index | Stream Footer |
//! +---------------+---------+-----+---------+-------+---------------+
//! ```
//!
//! Each block is a block header, compressed data, padding to a multiple of
//! four, and the check value of the uncompressed data.

pub mod block;
pub mod check;
pub mod header;
pub mod index;
pub mod stream;
pub mod vli;

/// Magic bytes at the start of every stream: `0xFD '7' 'z' 'X' 'Z' 0x00`.
pub const HEADER_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Magic bytes at the end of every stream: `'Y' 'Z'`.
pub const FOOTER_MAGIC: [u8; 2] = [0x59, 0x5A];

/// Size of the stream header and of the stream footer.
pub const STREAM_HEADER_SIZE: usize = 12;

/// Largest possible block header.
pub const BLOCK_HEADER_SIZE_MAX: usize = 1024;

/// Smallest valid unpadded block size (header, one byte of data, no check).
pub const UNPADDED_SIZE_MIN: u64 = 5;

/// Largest valid unpadded block size.
pub const UNPADDED_SIZE_MAX: u64 = vli::VLI_MAX & !3;

/// Largest index size a footer can describe.
pub const BACKWARD_SIZE_MAX: u64 = 1 << 34;

/// Rounds `n` up to a multiple of four.
#[inline]
pub(crate) fn pad4(n: u64) -> u64 {
    (n + 3) & !3
}
