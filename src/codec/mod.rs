//! Filter chain infrastructure for .xz blocks.
//!
//! A block header names up to four filters. The last one is always LZMA2
//! and reads the compressed bytes; the others (Delta and the BCJ family)
//! undo a reversible transform on LZMA2's output. [`Filter`] is the parsed
//! form of one header entry and [`Pipeline`] is the running chain.

pub mod dict;
pub mod filters;
pub mod lzma;
pub mod lzma2;
pub(crate) mod lzma_rc;
pub mod pipeline;

use crate::{Error, Result};

pub use filters::{BcjArch, SimpleFilter};
pub use lzma2::Lzma2Decoder;
pub use pipeline::Pipeline;

/// Maximum number of filters in one block.
pub const FILTERS_MAX: usize = 4;

/// Filter IDs as stored in block headers.
pub mod filter_id {
    /// Delta filter.
    pub const DELTA: u64 = 0x03;
    /// BCJ (x86) filter.
    pub const BCJ_X86: u64 = 0x04;
    /// BCJ (PowerPC) filter.
    pub const BCJ_PPC: u64 = 0x05;
    /// BCJ (IA64) filter.
    pub const BCJ_IA64: u64 = 0x06;
    /// BCJ (ARM) filter.
    pub const BCJ_ARM: u64 = 0x07;
    /// BCJ (ARM Thumb) filter.
    pub const BCJ_ARM_THUMB: u64 = 0x08;
    /// BCJ (SPARC) filter.
    pub const BCJ_SPARC: u64 = 0x09;
    /// BCJ (ARM64/AArch64) filter.
    pub const BCJ_ARM64: u64 = 0x0A;
    /// BCJ (RISC-V) filter.
    pub const BCJ_RISCV: u64 = 0x0B;
    /// LZMA2 compression.
    pub const LZMA2: u64 = 0x21;

    /// Returns a human-readable name for a filter ID.
    pub fn name(id: u64) -> &'static str {
        match id {
            DELTA => "Delta",
            BCJ_X86 => "BCJ (x86)",
            BCJ_PPC => "BCJ (PowerPC)",
            BCJ_IA64 => "BCJ (IA64)",
            BCJ_ARM => "BCJ (ARM)",
            BCJ_ARM_THUMB => "BCJ (ARM Thumb)",
            BCJ_SPARC => "BCJ (SPARC)",
            BCJ_ARM64 => "BCJ (ARM64)",
            BCJ_RISCV => "BCJ (RISC-V)",
            LZMA2 => "LZMA2",
            _ => "Unknown",
        }
    }
}

/// One decoded entry of a block's filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// LZMA2 with its dictionary size.
    Lzma2 {
        /// Dictionary size in bytes.
        dict_size: u32,
    },
    /// Delta with its distance (1-256).
    Delta {
        /// Distance in bytes.
        distance: u32,
    },
    /// A branch converter.
    Bcj {
        /// Target architecture.
        arch: BcjArch,
        /// Stream position the conversion starts counting from.
        start_offset: u32,
    },
}

impl Filter {
    /// Parses a filter ID and its properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOptions`] for unknown IDs, the RISC-V
    /// converter, and properties of the wrong size or range.
    pub fn from_raw(id: u64, props: &[u8]) -> Result<Self> {
        let arch = match id {
            filter_id::LZMA2 => {
                let &[prop] = props else {
                    return Err(Error::unsupported(format!(
                        "LZMA2 properties must be 1 byte, got {}",
                        props.len()
                    )));
                };
                let dict_size = lzma2::dict_size_from_prop(prop)?;
                return Ok(Filter::Lzma2 { dict_size });
            }
            filter_id::DELTA => {
                let &[prop] = props else {
                    return Err(Error::unsupported(format!(
                        "Delta properties must be 1 byte, got {}",
                        props.len()
                    )));
                };
                return Ok(Filter::Delta {
                    distance: u32::from(prop) + 1,
                });
            }
            filter_id::BCJ_X86 => BcjArch::X86,
            filter_id::BCJ_PPC => BcjArch::PowerPc,
            filter_id::BCJ_IA64 => BcjArch::Ia64,
            filter_id::BCJ_ARM => BcjArch::Arm,
            filter_id::BCJ_ARM_THUMB => BcjArch::ArmThumb,
            filter_id::BCJ_SPARC => BcjArch::Sparc,
            filter_id::BCJ_ARM64 => BcjArch::Arm64,
            filter_id::BCJ_RISCV => {
                return Err(Error::unsupported("BCJ (RISC-V) filter is not supported"));
            }
            other => {
                return Err(Error::unsupported(format!("unknown filter ID {:#x}", other)));
            }
        };

        let start_offset = match *props {
            [] => 0,
            [a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
            _ => {
                return Err(Error::unsupported(format!(
                    "{} properties must be 0 or 4 bytes, got {}",
                    filter_id::name(id),
                    props.len()
                )));
            }
        };
        Ok(Filter::Bcj { arch, start_offset })
    }

    /// Returns the filter ID.
    pub fn id(&self) -> u64 {
        match self {
            Filter::Lzma2 { .. } => filter_id::LZMA2,
            Filter::Delta { .. } => filter_id::DELTA,
            Filter::Bcj { arch, .. } => match arch {
                BcjArch::X86 => filter_id::BCJ_X86,
                BcjArch::PowerPc => filter_id::BCJ_PPC,
                BcjArch::Ia64 => filter_id::BCJ_IA64,
                BcjArch::Arm => filter_id::BCJ_ARM,
                BcjArch::ArmThumb => filter_id::BCJ_ARM_THUMB,
                BcjArch::Sparc => filter_id::BCJ_SPARC,
                BcjArch::Arm64 => filter_id::BCJ_ARM64,
            },
        }
    }

    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        filter_id::name(self.id())
    }

    /// Returns the memory this stage needs while decoding.
    pub fn memory_usage(&self) -> u64 {
        match self {
            Filter::Lzma2 { dict_size } => Lzma2Decoder::memory_usage(*dict_size),
            _ => pipeline::stage_memory_usage(),
        }
    }
}

/// Checks that a chain has 1-4 filters and that only the last is LZMA2.
///
/// # Errors
///
/// Returns [`Error::UnsupportedOptions`] otherwise.
pub fn validate_chain(filters: &[Filter]) -> Result<()> {
    let Some((last, rest)) = filters.split_last() else {
        return Err(Error::unsupported("empty filter chain"));
    };
    if filters.len() > FILTERS_MAX {
        return Err(Error::unsupported(format!(
            "filter chain has {} filters (max {})",
            filters.len(),
            FILTERS_MAX
        )));
    }
    if !matches!(last, Filter::Lzma2 { .. }) {
        return Err(Error::unsupported(format!(
            "{} cannot be the last filter",
            last.name()
        )));
    }
    if rest.iter().any(|f| matches!(f, Filter::Lzma2 { .. })) {
        return Err(Error::unsupported("LZMA2 must be the last filter"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_lzma2() {
        assert_eq!(
            Filter::from_raw(filter_id::LZMA2, &[0x16]).unwrap(),
            Filter::Lzma2 { dict_size: 8 << 20 }
        );
        assert!(Filter::from_raw(filter_id::LZMA2, &[]).unwrap_err().is_unsupported());
        assert!(Filter::from_raw(filter_id::LZMA2, &[41]).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_from_raw_delta() {
        assert_eq!(
            Filter::from_raw(filter_id::DELTA, &[0xFF]).unwrap(),
            Filter::Delta { distance: 256 }
        );
        assert!(Filter::from_raw(filter_id::DELTA, &[1, 2]).is_err());
    }

    #[test]
    fn test_from_raw_bcj_start_offset() {
        assert_eq!(
            Filter::from_raw(filter_id::BCJ_ARM, &[]).unwrap(),
            Filter::Bcj {
                arch: BcjArch::Arm,
                start_offset: 0
            }
        );
        assert_eq!(
            Filter::from_raw(filter_id::BCJ_X86, &[0x00, 0x10, 0x00, 0x00]).unwrap(),
            Filter::Bcj {
                arch: BcjArch::X86,
                start_offset: 0x1000
            }
        );
        assert!(Filter::from_raw(filter_id::BCJ_X86, &[1, 2]).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_riscv_and_unknown_unsupported() {
        let err = Filter::from_raw(filter_id::BCJ_RISCV, &[]).unwrap_err();
        assert!(err.to_string().contains("RISC-V"));
        assert!(Filter::from_raw(0x4000_0000_0000_0000, &[]).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_id_roundtrip() {
        for id in [3u64, 4, 5, 6, 7, 8, 9, 10] {
            let props: &[u8] = if id == filter_id::DELTA { &[0] } else { &[] };
            assert_eq!(Filter::from_raw(id, props).unwrap().id(), id);
        }
    }

    #[test]
    fn test_validate_chain() {
        let lzma2 = Filter::Lzma2 { dict_size: 1 << 20 };
        let x86 = Filter::Bcj {
            arch: BcjArch::X86,
            start_offset: 0,
        };
        let delta = Filter::Delta { distance: 4 };

        assert!(validate_chain(&[lzma2]).is_ok());
        assert!(validate_chain(&[x86, delta, x86, lzma2]).is_ok());
        assert!(validate_chain(&[]).is_err());
        assert!(validate_chain(&[x86]).is_err());
        assert!(validate_chain(&[lzma2, lzma2]).is_err());
        assert!(validate_chain(&[x86, delta, x86, delta, lzma2]).is_err());
    }
}
