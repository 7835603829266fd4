//! Pre-processing filter decoders (BCJ, Delta).
//!
//! These filters are applied after decompression to undo the transforms
//! that improve compression ratios for specific data types like
//! executables (BCJ) or audio/image data (Delta).
//!
//! Each filter converts a buffer in place and returns how many bytes it
//! finished; the rest (at most [`SimpleFilter::lookahead`] bytes) must be
//! presented again together with the bytes that follow.
//!
//! # Algorithm
//!
//! For encoding: `value += current_position` (relative to absolute)
//! For decoding: `value -= current_position` (absolute to relative)

/// Architecture of a branch converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BcjArch {
    /// x86 (32-bit and 64-bit).
    X86,
    /// PowerPC (big endian).
    PowerPc,
    /// IA-64 (Itanium).
    Ia64,
    /// ARM (32-bit).
    Arm,
    /// ARM Thumb.
    ArmThumb,
    /// SPARC.
    Sparc,
    /// ARM64 (AArch64).
    Arm64,
}

/// A non-compressing filter with its running state.
#[derive(Debug, Clone)]
pub enum SimpleFilter {
    /// x86 BCJ.
    X86 {
        /// Recent E8/E9 candidates that were rejected.
        prev_mask: u32,
        /// Position of the last E8/E9 byte.
        prev_pos: u32,
    },
    /// PowerPC BCJ.
    PowerPc,
    /// IA-64 BCJ.
    Ia64,
    /// ARM BCJ.
    Arm,
    /// ARM Thumb BCJ.
    ArmThumb,
    /// SPARC BCJ.
    Sparc,
    /// ARM64 BCJ.
    Arm64,
    /// Byte-wise delta.
    Delta {
        /// Distance in bytes (1-256).
        distance: usize,
        /// Write index into `history`, counting down.
        pos: u8,
        /// The last 256 output bytes.
        history: [u8; 256],
    },
}

impl SimpleFilter {
    /// Creates a branch converter for `arch`.
    pub fn bcj(arch: BcjArch) -> Self {
        match arch {
            BcjArch::X86 => SimpleFilter::X86 {
                prev_mask: 0,
                prev_pos: 0u32.wrapping_sub(5),
            },
            BcjArch::PowerPc => SimpleFilter::PowerPc,
            BcjArch::Ia64 => SimpleFilter::Ia64,
            BcjArch::Arm => SimpleFilter::Arm,
            BcjArch::ArmThumb => SimpleFilter::ArmThumb,
            BcjArch::Sparc => SimpleFilter::Sparc,
            BcjArch::Arm64 => SimpleFilter::Arm64,
        }
    }

    /// Creates a delta filter.
    pub fn delta(distance: usize) -> Self {
        SimpleFilter::Delta {
            distance,
            pos: 0,
            history: [0; 256],
        }
    }

    /// Returns the most bytes the filter may leave unconverted at the end of a buffer.
    pub fn lookahead(&self) -> usize {
        match self {
            SimpleFilter::X86 { .. } => 5,
            SimpleFilter::Ia64 => 16,
            SimpleFilter::Delta { .. } => 0,
            _ => 4,
        }
    }

    /// Converts `buf` in place, which starts at stream position `now_pos`.
    ///
    /// Returns the number of leading bytes that are final.
    pub fn apply(&mut self, now_pos: u32, buf: &mut [u8]) -> usize {
        match self {
            SimpleFilter::X86 {
                prev_mask,
                prev_pos,
            } => x86_decode(prev_mask, prev_pos, now_pos, buf),
            SimpleFilter::PowerPc => ppc_decode(now_pos, buf),
            SimpleFilter::Ia64 => ia64_decode(now_pos, buf),
            SimpleFilter::Arm => arm_decode(now_pos, buf),
            SimpleFilter::ArmThumb => arm_thumb_decode(now_pos, buf),
            SimpleFilter::Sparc => sparc_decode(now_pos, buf),
            SimpleFilter::Arm64 => arm64_decode(now_pos, buf),
            SimpleFilter::Delta {
                distance,
                pos,
                history,
            } => {
                delta_decode(*distance, pos, history, buf);
                buf.len()
            }
        }
    }
}

// =============================================================================
// BCJ x86
// =============================================================================

#[inline]
fn test_x86_ms_byte(b: u8) -> bool {
    b == 0x00 || b == 0xFF
}

/// Converts x86 CALL (E8) and JMP (E9) absolute addresses back to relative ones.
fn x86_decode(prev_mask: &mut u32, prev_pos: &mut u32, now_pos: u32, buf: &mut [u8]) -> usize {
    const MASK_TO_ALLOWED_STATUS: [bool; 8] = [true, true, true, false, true, false, false, false];
    const MASK_TO_BIT_NUMBER: [u32; 8] = [0, 1, 2, 2, 3, 3, 3, 3];

    if buf.len() < 5 {
        return 0;
    }

    let mut mask = *prev_mask;
    let mut last = *prev_pos;
    if now_pos.wrapping_sub(last) > 5 {
        last = now_pos.wrapping_sub(5);
    }

    let limit = buf.len() - 5;
    let mut pos = 0usize;

    while pos <= limit {
        let b = buf[pos];
        if b != 0xE8 && b != 0xE9 {
            pos += 1;
            continue;
        }

        let here = now_pos.wrapping_add(pos as u32);
        let offset = here.wrapping_sub(last);
        last = here;

        if offset > 5 {
            mask = 0;
        } else {
            for _ in 0..offset {
                mask &= 0x77;
                mask <<= 1;
            }
        }

        let b = buf[pos + 4];
        if test_x86_ms_byte(b)
            && MASK_TO_ALLOWED_STATUS[((mask >> 1) & 0x7) as usize]
            && (mask >> 1) < 0x10
        {
            let mut src = u32::from_le_bytes([buf[pos + 1], buf[pos + 2], buf[pos + 3], b]);
            let mut dest;
            loop {
                dest = src.wrapping_sub(here.wrapping_add(5));
                if mask == 0 {
                    break;
                }
                let i = MASK_TO_BIT_NUMBER[(mask >> 1) as usize];
                let b = (dest >> (24 - i * 8)) as u8;
                if !test_x86_ms_byte(b) {
                    break;
                }
                src = dest ^ ((1u32 << (32 - i * 8)) - 1);
            }

            let bytes = dest.to_le_bytes();
            buf[pos + 1] = bytes[0];
            buf[pos + 2] = bytes[1];
            buf[pos + 3] = bytes[2];
            buf[pos + 4] = !(((dest >> 24) & 1) as u8).wrapping_sub(1);
            pos += 5;
            mask = 0;
        } else {
            pos += 1;
            mask |= 1;
            if test_x86_ms_byte(b) {
                mask |= 0x10;
            }
        }
    }

    *prev_mask = mask;
    *prev_pos = last;
    pos
}

// =============================================================================
// BCJ PowerPC
// =============================================================================

/// Converts PowerPC `bl` (0x48xxxxx1) targets; instructions are big endian.
fn ppc_decode(now_pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        if (buf[i] >> 2) == 0x12 && (buf[i + 3] & 3) == 1 {
            let src = u32::from_be_bytes([buf[i] & 3, buf[i + 1], buf[i + 2], buf[i + 3] & !3]);
            let dest = src.wrapping_sub(now_pos.wrapping_add(i as u32));

            buf[i] = 0x48 | ((dest >> 24) as u8 & 0x03);
            buf[i + 1] = (dest >> 16) as u8;
            buf[i + 2] = (dest >> 8) as u8;
            buf[i + 3] = (buf[i + 3] & 0x03) | dest as u8;
        }
        i += 4;
    }
    i
}

// =============================================================================
// BCJ IA-64
// =============================================================================

/// Slots of each bundle template that can hold a branch (bit per slot).
const IA64_BRANCH_TABLE: [u8; 32] = [
    0, 0, 0, 0, 0, 0, 0, 0, // Templates 0x00-0x07
    0, 0, 0, 0, 0, 0, 0, 0, // Templates 0x08-0x0F
    4, 4, 6, 6, 0, 0, 7, 7, // Templates 0x10-0x17
    4, 4, 0, 0, 4, 4, 0, 0, // Templates 0x18-0x1F
];

/// Converts IA-64 IP-relative branches.
///
/// Bundles are 16 bytes: a 5-bit template and three 41-bit slots.
fn ia64_decode(now_pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 16 <= buf.len() {
        let branch_mask = IA64_BRANCH_TABLE[usize::from(buf[i] & 0x1F)];
        let mut bit_pos = 5usize;

        for slot in 0..3 {
            if (branch_mask >> slot) & 1 == 0 {
                bit_pos += 41;
                continue;
            }

            let byte_pos = i + (bit_pos >> 3);
            let bit_res = bit_pos & 0x7;
            let mut instruction = 0u64;
            for j in 0..6 {
                instruction |= u64::from(buf[byte_pos + j]) << (8 * j);
            }

            let mut inst_norm = instruction >> bit_res;
            if ((inst_norm >> 37) & 0xF) == 0x5 && ((inst_norm >> 9) & 0x7) == 0 {
                let mut src = ((inst_norm >> 13) & 0xF_FFFF) as u32;
                src |= (((inst_norm >> 36) & 1) as u32) << 20;
                src <<= 4;

                let mut dest = src.wrapping_sub(now_pos.wrapping_add(i as u32));
                dest >>= 4;

                inst_norm &= !(0x8F_FFFFu64 << 13);
                inst_norm |= u64::from(dest & 0xF_FFFF) << 13;
                inst_norm |= u64::from(dest & 0x10_0000) << (36 - 20);

                instruction &= (1u64 << bit_res) - 1;
                instruction |= inst_norm << bit_res;

                for j in 0..6 {
                    buf[byte_pos + j] = (instruction >> (8 * j)) as u8;
                }
            }
            bit_pos += 41;
        }
        i += 16;
    }
    i
}

// =============================================================================
// BCJ ARM
// =============================================================================

/// Converts ARM BL (branch with link) instruction targets.
fn arm_decode(now_pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        if buf[i + 3] == 0xEB {
            let src = u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], 0]) << 2;
            let dest = src.wrapping_sub(now_pos.wrapping_add(i as u32).wrapping_add(8)) >> 2;

            buf[i + 2] = (dest >> 16) as u8;
            buf[i + 1] = (dest >> 8) as u8;
            buf[i] = dest as u8;
        }
        i += 4;
    }
    i
}

// =============================================================================
// BCJ ARM Thumb
// =============================================================================

/// Converts ARM Thumb BL instruction pairs (F000-F800 range).
fn arm_thumb_decode(now_pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        if (buf[i + 1] & 0xF8) == 0xF0 && (buf[i + 3] & 0xF8) == 0xF8 {
            let mut src = (u32::from(buf[i + 1] & 7) << 19)
                | (u32::from(buf[i]) << 11)
                | (u32::from(buf[i + 3] & 7) << 8)
                | u32::from(buf[i + 2]);
            src <<= 1;

            let dest = src.wrapping_sub(now_pos.wrapping_add(i as u32).wrapping_add(4)) >> 1;

            buf[i + 1] = 0xF0 | ((dest >> 19) & 0x7) as u8;
            buf[i] = (dest >> 11) as u8;
            buf[i + 3] = 0xF8 | ((dest >> 8) & 0x7) as u8;
            buf[i + 2] = dest as u8;
            i += 2;
        }
        i += 2;
    }
    i
}

// =============================================================================
// BCJ SPARC
// =============================================================================

/// Converts SPARC CALL instruction targets; instructions are big endian.
fn sparc_decode(now_pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        if (buf[i] == 0x40 && (buf[i + 1] & 0xC0) == 0x00)
            || (buf[i] == 0x7F && (buf[i + 1] & 0xC0) == 0xC0)
        {
            let src = u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]) << 2;
            let mut dest = src.wrapping_sub(now_pos.wrapping_add(i as u32)) >> 2;
            dest = ((0u32.wrapping_sub((dest >> 22) & 1) << 22) & 0x3FFF_FFFF)
                | (dest & 0x3F_FFFF)
                | 0x4000_0000;

            buf[i..i + 4].copy_from_slice(&dest.to_be_bytes());
        }
        i += 4;
    }
    i
}

// =============================================================================
// BCJ ARM64
// =============================================================================

/// Converts ARM64 BL and ADRP instructions.
fn arm64_decode(now_pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        let pc = now_pos.wrapping_add(i as u32);
        let mut instr = u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);

        if (instr >> 26) == 0x25 {
            // BL
            let src = instr;
            let pc = 0u32.wrapping_sub(pc >> 2);
            instr = 0x9400_0000 | (src.wrapping_add(pc) & 0x03FF_FFFF);
            buf[i..i + 4].copy_from_slice(&instr.to_le_bytes());
        } else if (instr & 0x9F00_0000) == 0x9000_0000 {
            // ADRP
            let src = ((instr >> 29) & 3) | ((instr >> 3) & 0x001F_FFFC);
            // Only addresses within +/-512 MiB are converted.
            if (src.wrapping_add(0x0002_0000) & 0x001C_0000) == 0 {
                instr &= 0x9000_001F;
                let pc = 0u32.wrapping_sub(pc >> 12);
                let dest = src.wrapping_add(pc);
                instr |= (dest & 3) << 29;
                instr |= (dest & 0x0003_FFFC) << 3;
                instr |= 0u32.wrapping_sub(dest & 0x0002_0000) & 0x00E0_0000;
                buf[i..i + 4].copy_from_slice(&instr.to_le_bytes());
            }
        }
        i += 4;
    }
    i
}

// =============================================================================
// Delta
// =============================================================================

/// Adds back the byte `distance` positions earlier.
fn delta_decode(distance: usize, pos: &mut u8, history: &mut [u8; 256], buf: &mut [u8]) {
    for byte in buf.iter_mut() {
        *byte = byte.wrapping_add(history[(distance + usize::from(*pos)) & 0xFF]);
        history[usize::from(*pos)] = *byte;
        *pos = pos.wrapping_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_distance_one() {
        // With delta distance 1:
        // out[0] = 1 + history = 1
        // out[1] = 2 + out[0] = 3
        // out[2] = 3 + out[1] = 6
        // out[3] = 4 + out[2] = 10
        let mut filter = SimpleFilter::delta(1);
        let mut buf = [1, 2, 3, 4];
        assert_eq!(filter.apply(0, &mut buf), 4);
        assert_eq!(buf, [1, 3, 6, 10]);
    }

    #[test]
    fn test_delta_state_carries_over() {
        let mut whole = SimpleFilter::delta(2);
        let mut expected = [1, 1, 1, 1, 1, 1];
        whole.apply(0, &mut expected);

        let mut split = SimpleFilter::delta(2);
        let mut a = [1, 1, 1];
        let mut b = [1, 1, 1];
        split.apply(0, &mut a);
        split.apply(3, &mut b);
        assert_eq!([a, b].concat(), expected);
        assert_eq!(expected, [1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_x86_call_converted() {
        // CALL with absolute target 0x105 at position 0 becomes relative 0x100.
        let mut filter = SimpleFilter::bcj(BcjArch::X86);
        let mut buf = [0xE8, 0x05, 0x01, 0x00, 0x00, 0x90, 0x90, 0x90, 0x90, 0x90];
        let done = filter.apply(0, &mut buf);
        assert_eq!(&buf[..5], &[0xE8, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(done, 6);
    }

    #[test]
    fn test_x86_short_buffer_untouched() {
        let mut filter = SimpleFilter::bcj(BcjArch::X86);
        let mut buf = [0xE8, 0x00, 0x00, 0x00];
        assert_eq!(filter.apply(0, &mut buf), 0);
        assert_eq!(buf, [0xE8, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_arm_bl_converted() {
        // BL at position 0x100 with absolute target field 0x50.
        let mut buf = [0x50, 0x00, 0x00, 0xEB];
        assert_eq!(arm_decode(0x100, &mut buf), 4);
        // (0x50 << 2) - (0x100 + 8) = 0x38, >> 2 = 0x0E
        assert_eq!(buf, [0x0E, 0x00, 0x00, 0xEB]);
    }

    #[test]
    fn test_ppc_branch_converted() {
        // bl with absolute target 0x1000 at position 0x10.
        let mut buf = 0x4800_1001u32.to_be_bytes();
        ppc_decode(0x10, &mut buf);
        assert_eq!(u32::from_be_bytes(buf), 0x4800_0FF1);
    }

    #[test]
    fn test_aligned_filters_leave_tail() {
        let mut buf = [0u8; 7];
        assert_eq!(arm_decode(0, &mut buf), 4);
        assert_eq!(sparc_decode(0, &mut buf), 4);
        assert_eq!(arm64_decode(0, &mut buf), 4);
        assert_eq!(ppc_decode(0, &mut buf), 4);

        let mut buf = [0u8; 31];
        assert_eq!(ia64_decode(0, &mut buf), 16);
    }

    #[test]
    fn test_arm64_bl_converted() {
        // BL with absolute word offset 0x40 at byte position 0x40.
        let mut buf = (0x9400_0040u32).to_le_bytes();
        arm64_decode(0x40, &mut buf);
        assert_eq!(u32::from_le_bytes(buf), 0x9400_0030);
    }

    #[test]
    fn test_lookahead() {
        assert_eq!(SimpleFilter::bcj(BcjArch::X86).lookahead(), 5);
        assert_eq!(SimpleFilter::bcj(BcjArch::Ia64).lookahead(), 16);
        assert_eq!(SimpleFilter::bcj(BcjArch::ArmThumb).lookahead(), 4);
        assert_eq!(SimpleFilter::delta(4).lookahead(), 0);
    }
}
