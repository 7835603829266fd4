//! Stream index decoding and verification.
//!
//! The index lists the unpadded and uncompressed size of every block in
//! the stream. The decoder never stores the list: both the blocks as they
//! are decoded and the index records as they are read are folded into an
//! [`IndexHash`], and the two summaries must agree.
//!
//! ```text
//! +-----------------+-------------------+------------+-----+---------+-------+
//! | Indicator: 0x00 | Number of Records | Records... | ... | Padding | CRC32 |
//! +-----------------+-------------------+------------+-----+---------+-------+
//! ```

use crate::checksum::{Checksum, Crc32, Crc64};
use crate::streaming::InputCursor;
use crate::{Error, Result};

use super::vli::{self, VLI_MAX, VliReader};
use super::{UNPADDED_SIZE_MAX, UNPADDED_SIZE_MIN, pad4};

/// Order-sensitive summary of a list of block sizes.
#[derive(Debug, Clone, Default)]
pub struct IndexHash {
    blocks_size: u64,
    uncompressed_size: u64,
    count: u64,
    index_list_size: u64,
    hash: Crc64,
}

impl IndexHash {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if a size is out of range or a total overflows.
    pub fn append(&mut self, unpadded: u64, uncompressed: u64) -> Result<()> {
        if !(UNPADDED_SIZE_MIN..=UNPADDED_SIZE_MAX).contains(&unpadded) {
            return Err(Error::corrupt(0, format!("invalid unpadded block size {}", unpadded)));
        }
        if uncompressed > VLI_MAX {
            return Err(Error::corrupt(0, "uncompressed block size out of range"));
        }

        let overflow = || Error::corrupt(0, "stream size out of range");
        self.blocks_size = self
            .blocks_size
            .checked_add(pad4(unpadded))
            .filter(|&n| n <= VLI_MAX)
            .ok_or_else(overflow)?;
        self.uncompressed_size = self
            .uncompressed_size
            .checked_add(uncompressed)
            .filter(|&n| n <= VLI_MAX)
            .ok_or_else(overflow)?;
        self.count += 1;
        self.index_list_size += (vli::size(unpadded) + vli::size(uncompressed)) as u64;

        self.hash.update(&unpadded.to_le_bytes());
        self.hash.update(&uncompressed.to_le_bytes());
        Ok(())
    }

    /// Returns the number of blocks added.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the total uncompressed size.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    fn same_as(&self, other: &IndexHash) -> bool {
        self.blocks_size == other.blocks_size
            && self.uncompressed_size == other.uncompressed_size
            && self.count == other.count
            && self.index_list_size == other.index_list_size
            && self.hash.finalize() == other.hash.finalize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seq {
    Indicator,
    Count,
    Unpadded,
    Uncompressed,
    Padding,
    Crc,
    Done,
}

/// Incremental index reader.
#[derive(Debug, Clone)]
pub struct IndexDecoder {
    seq: Seq,
    vli: VliReader,
    remaining: u64,
    unpadded: u64,
    records: IndexHash,
    crc: Crc32,
    stored_crc: [u8; 4],
    crc_pos: usize,
    size: u64,
}

impl Default for IndexDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexDecoder {
    /// Creates a decoder positioned at the index indicator byte.
    pub fn new() -> Self {
        Self {
            seq: Seq::Indicator,
            vli: VliReader::new(),
            remaining: 0,
            unpadded: 0,
            records: IndexHash::new(),
            crc: Crc32::new(),
            stored_crc: [0; 4],
            crc_pos: 0,
            size: 0,
        }
    }

    /// Returns the number of index bytes read so far.
    ///
    /// Equals the full index size once [`decode`](Self::decode) returned `true`.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads index bytes and checks them against the decoded `blocks`.
    ///
    /// Returns `true` once the CRC32 has been read and verified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the record count, the records, the
    /// padding or the CRC32 do not match.
    pub fn decode(&mut self, input: &mut InputCursor<'_>, blocks: &IndexHash) -> Result<bool> {
        loop {
            match self.seq {
                Seq::Done => return Ok(true),
                Seq::Padding if self.size % 4 == 0 => {
                    self.seq = Seq::Crc;
                    continue;
                }
                _ => {}
            }

            let Some(byte) = input.read_byte() else {
                return Ok(false);
            };
            self.size += 1;
            if self.seq != Seq::Crc {
                self.crc.update(&[byte]);
            }

            match self.seq {
                Seq::Indicator => {
                    if byte != 0x00 {
                        return Err(Error::corrupt(0, "index indicator is not zero"));
                    }
                    self.seq = Seq::Count;
                }
                Seq::Count => {
                    if let Some(count) = self.vli.push(byte)? {
                        if count != blocks.count() {
                            return Err(Error::corrupt(
                                0,
                                format!(
                                    "index lists {} records but the stream has {} blocks",
                                    count,
                                    blocks.count()
                                ),
                            ));
                        }
                        self.remaining = count;
                        self.seq = if count == 0 { Seq::Padding } else { Seq::Unpadded };
                    }
                }
                Seq::Unpadded => {
                    if let Some(value) = self.vli.push(byte)? {
                        self.unpadded = value;
                        self.seq = Seq::Uncompressed;
                    }
                }
                Seq::Uncompressed => {
                    if let Some(value) = self.vli.push(byte)? {
                        self.records.append(self.unpadded, value)?;
                        self.remaining -= 1;
                        if self.remaining > 0 {
                            self.seq = Seq::Unpadded;
                        } else if self.records.same_as(blocks) {
                            self.seq = Seq::Padding;
                        } else {
                            return Err(Error::corrupt(0, "index records do not match the decoded blocks"));
                        }
                    }
                }
                Seq::Padding => {
                    if byte != 0x00 {
                        return Err(Error::corrupt(0, "non-zero index padding"));
                    }
                }
                Seq::Crc => {
                    self.stored_crc[self.crc_pos] = byte;
                    self.crc_pos += 1;
                    if self.crc_pos == 4 {
                        let stored = u32::from_le_bytes(self.stored_crc);
                        let calculated = self.crc.finalize();
                        if stored != calculated {
                            return Err(Error::corrupt(
                                0,
                                format!(
                                    "index CRC mismatch: expected {:#x}, got {:#x}",
                                    stored, calculated
                                ),
                            ));
                        }
                        self.seq = Seq::Done;
                    }
                }
                Seq::Done => return Err(Error::ProgError("index read past its end")),
            }
        }
    }
}
