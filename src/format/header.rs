//! Stream header, stream footer and block header structures.

use crate::checksum::{Checksum, Crc32};
use crate::codec::{FILTERS_MAX, Filter};
use crate::{Error, Result};

use super::check::CheckKind;
use super::{BACKWARD_SIZE_MAX, FOOTER_MAGIC, HEADER_MAGIC, STREAM_HEADER_SIZE, UNPADDED_SIZE_MAX, vli};

/// The two flag bytes shared by the stream header and footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFlags {
    /// Integrity check used by every block of the stream.
    pub check: CheckKind,
}

impl StreamFlags {
    /// Decodes the flag bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOptions`] if a reserved bit is set.
    pub fn decode(bytes: [u8; 2]) -> Result<Self> {
        if bytes[0] != 0 || bytes[1] & 0xF0 != 0 {
            return Err(Error::unsupported(format!(
                "reserved stream flag bits set: {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        let check = CheckKind::from_id(bytes[1] & 0x0F)
            .ok_or_else(|| Error::unsupported("invalid check ID"))?;
        Ok(Self { check })
    }

    /// Encodes the flag bytes.
    pub fn encode(&self) -> [u8; 2] {
        [0, self.check.id()]
    }
}

/// The 12-byte header that starts every stream.
///
/// ```text
/// +---+---+---+---+---+---+-------+---+---+---+---+
/// |  Header Magic Bytes   | Flags |     CRC32     |
/// +---+---+---+---+---+---+-------+---+---+---+---+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream flags.
    pub flags: StreamFlags,
}

impl StreamHeader {
    /// Parses a stream header.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The magic bytes are wrong ([`Error::Format`])
    /// - The CRC32 doesn't match ([`Error::Corrupt`])
    /// - A reserved flag bit is set ([`Error::UnsupportedOptions`])
    pub fn parse(buf: &[u8; STREAM_HEADER_SIZE]) -> Result<Self> {
        if buf[..6] != HEADER_MAGIC {
            return Err(Error::Format("missing stream header magic".into()));
        }

        let stored = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let calculated = Crc32::compute(&buf[6..8]);
        if stored != calculated {
            return Err(Error::corrupt(
                0,
                format!(
                    "stream header CRC mismatch: expected {:#x}, got {:#x}",
                    stored, calculated
                ),
            ));
        }

        let flags = StreamFlags::decode([buf[6], buf[7]])?;
        Ok(Self { flags })
    }
}

/// The 12-byte footer that ends every stream.
///
/// ```text
/// +-+-+-+-+---+---+---+---+-------+------+----------+
/// | CRC32 | Backward Size | Flags | Footer Magic    |
/// +-+-+-+-+---+---+---+---+-------+------+----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFooter {
    /// Stream flags; must equal the header's.
    pub flags: StreamFlags,
    /// Size of the index in bytes.
    pub backward_size: u64,
}

impl StreamFooter {
    /// Parses a stream footer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for a bad magic or CRC32, and
    /// [`Error::UnsupportedOptions`] for reserved flag bits.
    pub fn parse(buf: &[u8; STREAM_HEADER_SIZE]) -> Result<Self> {
        if buf[10..] != FOOTER_MAGIC {
            return Err(Error::corrupt(0, "missing stream footer magic"));
        }

        let stored = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let calculated = Crc32::compute(&buf[4..10]);
        if stored != calculated {
            return Err(Error::corrupt(
                0,
                format!(
                    "stream footer CRC mismatch: expected {:#x}, got {:#x}",
                    stored, calculated
                ),
            ));
        }

        let flags = StreamFlags::decode([buf[8], buf[9]])?;
        let backward_size = (u64::from(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]])) + 1) * 4;
        debug_assert!(backward_size <= BACKWARD_SIZE_MAX);
        Ok(Self {
            flags,
            backward_size,
        })
    }
}

/// A parsed block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Size of the header itself, 8-1024 bytes.
    pub header_size: usize,
    /// Declared size of the compressed data, if present.
    pub compressed_size: Option<u64>,
    /// Declared size of the uncompressed data, if present.
    pub uncompressed_size: Option<u64>,
    /// Filter chain, LZMA2 last.
    pub filters: Vec<Filter>,
}

impl BlockHeader {
    /// Returns the header size announced by its first byte.
    ///
    /// The first byte must not be zero; that value introduces the index.
    pub fn size_from_first_byte(byte: u8) -> usize {
        (usize::from(byte) + 1) * 4
    }

    /// Parses a complete block header.
    ///
    /// `check` is the stream's check type, needed to validate the declared
    /// compressed size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for a bad CRC32, malformed integers or
    /// impossible sizes, and [`Error::UnsupportedOptions`] for reserved
    /// bits, non-zero padding, and unknown or invalid filters.
    pub fn parse(buf: &[u8], check: CheckKind) -> Result<Self> {
        let header_size = buf
            .first()
            .map(|&b| Self::size_from_first_byte(b))
            .filter(|&size| size == buf.len() && buf[0] != 0)
            .ok_or(Error::ProgError("block header buffer has the wrong size"))?;

        let body = &buf[..header_size - 4];
        let stored = u32::from_le_bytes([
            buf[header_size - 4],
            buf[header_size - 3],
            buf[header_size - 2],
            buf[header_size - 1],
        ]);
        let calculated = Crc32::compute(body);
        if stored != calculated {
            return Err(Error::corrupt(
                0,
                format!(
                    "block header CRC mismatch: expected {:#x}, got {:#x}",
                    stored, calculated
                ),
            ));
        }

        let flags = body[1];
        if flags & 0x3C != 0 {
            return Err(Error::unsupported(format!(
                "reserved block flag bits set: {:#04x}",
                flags
            )));
        }

        let mut pos = 2;
        let read_vli = |pos: &mut usize| -> Result<u64> {
            let (value, len) = vli::decode(&body[*pos..])?;
            *pos += len;
            Ok(value)
        };

        let compressed_size = if flags & 0x40 != 0 {
            let size = read_vli(&mut pos)?;
            let unpadded = size
                .checked_add(header_size as u64)
                .and_then(|n| n.checked_add(check.size() as u64));
            if size == 0 || unpadded.is_none_or(|n| n > UNPADDED_SIZE_MAX) {
                return Err(Error::corrupt(0, format!("invalid compressed size {}", size)));
            }
            Some(size)
        } else {
            None
        };

        let uncompressed_size = if flags & 0x80 != 0 {
            Some(read_vli(&mut pos)?)
        } else {
            None
        };

        let count = usize::from(flags & 0x03) + 1;
        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let id = read_vli(&mut pos)?;
            let props_size = read_vli(&mut pos)?;
            let remaining = (body.len() - pos) as u64;
            if props_size > remaining {
                return Err(Error::corrupt(
                    0,
                    format!("filter properties size {} exceeds block header", props_size),
                ));
            }
            let props = &body[pos..pos + props_size as usize];
            pos += props_size as usize;
            filters.push(Filter::from_raw(id, props)?);
        }
        debug_assert!(filters.len() <= FILTERS_MAX);
        crate::codec::validate_chain(&filters)?;

        if body[pos..].iter().any(|&b| b != 0) {
            return Err(Error::unsupported("non-zero block header padding"));
        }

        Ok(Self {
            header_size,
            compressed_size,
            uncompressed_size,
            filters,
        })
    }
}
