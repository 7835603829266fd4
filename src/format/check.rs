//! Block integrity checks.
//!
//! Every block of an .xz stream is followed by a check value computed over
//! its uncompressed data. The check type is declared once in the stream
//! header; [`CheckVerifier`] accumulates the digest while a block is decoded
//! and compares it with the stored value afterwards.

use std::fmt;

use crate::checksum::{Checksum, Crc32, Crc64};

#[cfg(feature = "sha256")]
use crate::checksum::Sha256;

/// Largest check value the format can declare (check IDs 13-15).
pub const CHECK_SIZE_MAX: usize = 64;

/// Size in bytes of the check value for every 4-bit check ID.
const CHECK_SIZES: [u8; 16] = [0, 4, 4, 4, 8, 8, 8, 16, 16, 16, 32, 32, 32, 64, 64, 64];

/// Check type declared in the stream flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// No integrity check (ID 0x00).
    None,
    /// CRC-32 (ID 0x01).
    Crc32,
    /// CRC-64 (ID 0x04).
    Crc64,
    /// SHA-256 (ID 0x0A).
    Sha256,
    /// A reserved check ID. Its values are skipped without verification.
    Reserved(u8),
}

impl CheckKind {
    /// Maps a 4-bit check ID to a check kind.
    ///
    /// Returns `None` for IDs above 15, which cannot appear in valid stream flags.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(CheckKind::None),
            0x01 => Some(CheckKind::Crc32),
            0x04 => Some(CheckKind::Crc64),
            0x0A => Some(CheckKind::Sha256),
            0x02..=0x0F => Some(CheckKind::Reserved(id)),
            _ => None,
        }
    }

    /// Returns the 4-bit check ID.
    pub fn id(self) -> u8 {
        match self {
            CheckKind::None => 0x00,
            CheckKind::Crc32 => 0x01,
            CheckKind::Crc64 => 0x04,
            CheckKind::Sha256 => 0x0A,
            CheckKind::Reserved(id) => id,
        }
    }

    /// Returns the size of the stored check value in bytes.
    pub fn size(self) -> usize {
        CHECK_SIZES[usize::from(self.id() & 0x0F)] as usize
    }

    /// Returns `true` if this build can compute the check.
    pub fn is_supported(self) -> bool {
        match self {
            CheckKind::None | CheckKind::Crc32 | CheckKind::Crc64 => true,
            CheckKind::Sha256 => cfg!(feature = "sha256"),
            CheckKind::Reserved(_) => false,
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::None => write!(f, "None"),
            CheckKind::Crc32 => write!(f, "CRC32"),
            CheckKind::Crc64 => write!(f, "CRC64"),
            CheckKind::Sha256 => write!(f, "SHA-256"),
            CheckKind::Reserved(id) => write!(f, "Check-{}", id),
        }
    }
}

/// Outcome of comparing a computed check with the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The values are equal.
    Match,
    /// The values differ.
    Mismatch {
        /// The stored value.
        expected: Vec<u8>,
        /// The computed value.
        actual: Vec<u8>,
    },
    /// The stream declares no check.
    NoCheck,
    /// The check type cannot be computed by this build; the value was skipped.
    Unsupported,
}

#[derive(Debug, Clone)]
enum Digest {
    Skip,
    Crc32(Crc32),
    Crc64(Crc64),
    #[cfg(feature = "sha256")]
    Sha256(Sha256),
}

/// Running digest over the uncompressed data of one block.
#[derive(Debug, Clone)]
pub struct CheckVerifier {
    kind: CheckKind,
    digest: Digest,
}

impl CheckVerifier {
    /// Creates a verifier for the given check type.
    pub fn new(kind: CheckKind) -> Self {
        let digest = match kind {
            CheckKind::Crc32 => Digest::Crc32(Crc32::new()),
            CheckKind::Crc64 => Digest::Crc64(Crc64::new()),
            #[cfg(feature = "sha256")]
            CheckKind::Sha256 => Digest::Sha256(Sha256::new()),
            _ => Digest::Skip,
        };
        Self { kind, digest }
    }

    /// Returns the check type.
    pub fn kind(&self) -> CheckKind {
        self.kind
    }

    /// Feeds uncompressed bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.digest {
            Digest::Skip => {}
            Digest::Crc32(c) => c.update(data),
            Digest::Crc64(c) => c.update(data),
            #[cfg(feature = "sha256")]
            Digest::Sha256(c) => c.update(data),
        }
    }

    /// Returns the computed value in its on-disk byte order.
    ///
    /// Empty for `None` and unsupported check types.
    pub fn finish(&self) -> Vec<u8> {
        match &self.digest {
            Digest::Skip => Vec::new(),
            Digest::Crc32(c) => c.finalize().to_le_bytes().to_vec(),
            Digest::Crc64(c) => c.finalize().to_le_bytes().to_vec(),
            #[cfg(feature = "sha256")]
            Digest::Sha256(c) => c.finalize().to_vec(),
        }
    }

    /// Compares the computed value with the stored bytes.
    pub fn verify(&self, stored: &[u8]) -> VerifyResult {
        match self.kind {
            CheckKind::None => VerifyResult::NoCheck,
            _ if !self.kind.is_supported() => VerifyResult::Unsupported,
            _ => {
                let actual = self.finish();
                if actual == stored {
                    VerifyResult::Match
                } else {
                    VerifyResult::Mismatch {
                        expected: stored.to_vec(),
                        actual,
                    }
                }
            }
        }
    }

    /// Restarts the digest for the next block.
    pub fn reset(&mut self) {
        *self = Self::new(self.kind);
    }
}

/// Formats bytes as lowercase hex for error messages.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_sizes() {
        assert_eq!(CheckKind::None.size(), 0);
        assert_eq!(CheckKind::Crc32.size(), 4);
        assert_eq!(CheckKind::Crc64.size(), 8);
        assert_eq!(CheckKind::Sha256.size(), 32);
        assert_eq!(CheckKind::Reserved(0x02).size(), 4);
        assert_eq!(CheckKind::Reserved(0x07).size(), 16);
        assert_eq!(CheckKind::Reserved(0x0F).size(), 64);
    }

    #[test]
    fn test_from_id() {
        assert_eq!(CheckKind::from_id(0x01), Some(CheckKind::Crc32));
        assert_eq!(CheckKind::from_id(0x0A), Some(CheckKind::Sha256));
        assert_eq!(CheckKind::from_id(0x05), Some(CheckKind::Reserved(0x05)));
        assert_eq!(CheckKind::from_id(0x10), None);
        for id in 0..16 {
            assert_eq!(CheckKind::from_id(id).unwrap().id(), id);
        }
    }

    #[test]
    fn test_crc32_verify() {
        let mut v = CheckVerifier::new(CheckKind::Crc32);
        v.update(b"1234");
        v.update(b"56789");
        assert_eq!(v.verify(&0xCBF43926u32.to_le_bytes()), VerifyResult::Match);
        assert!(matches!(v.verify(&[0, 0, 0, 0]), VerifyResult::Mismatch { .. }));
    }

    #[test]
    fn test_crc64_verify() {
        let mut v = CheckVerifier::new(CheckKind::Crc64);
        v.update(b"123456789");
        assert_eq!(
            v.verify(&0x995DC9BBDF1939FAu64.to_le_bytes()),
            VerifyResult::Match
        );
    }

    #[test]
    fn test_none_and_reserved() {
        let v = CheckVerifier::new(CheckKind::None);
        assert_eq!(v.verify(&[]), VerifyResult::NoCheck);

        let mut v = CheckVerifier::new(CheckKind::Reserved(0x03));
        v.update(b"data");
        assert_eq!(v.verify(&[1, 2, 3, 4]), VerifyResult::Unsupported);
    }

    #[test]
    fn test_reset_restarts_digest() {
        let mut v = CheckVerifier::new(CheckKind::Crc32);
        v.update(b"garbage");
        v.reset();
        v.update(b"123456789");
        assert_eq!(v.finish(), 0xCBF43926u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0xde, 0xad, 0x01]), "dead01");
    }
}
