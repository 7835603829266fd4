//! LZMA range decoder.
//!
//! This module provides the binary range decoder that every LZMA symbol is
//! read through. It supports:
//! - Adaptive probability-based bit decoding
//! - Direct bit decoding (for distance extra bits)
//! - Bit tree decoding, forward and reverse
//!
//! The decoder does not check input bounds per bit. Instead the caller
//! guarantees that at least [`LZMA_IN_REQUIRED`] bytes follow the position
//! at which a symbol starts; [`RcInput::limit_reached`] tells the symbol loop
//! when to stop. Reads past the end of the window return zero.

/// Number of bits for probability model total.
pub const NUM_BIT_MODEL_TOTAL_BITS: u32 = 11;

/// Total probability value (2048).
pub const BIT_MODEL_TOTAL: u32 = 1 << NUM_BIT_MODEL_TOTAL_BITS;

/// Number of bits to shift for probability updates.
pub const NUM_MOVE_BITS: u32 = 5;

/// Number of top bits for normalization threshold.
pub const NUM_TOP_BITS: u32 = 24;

/// Normalization threshold.
pub const TOP_VALUE: u32 = 1 << NUM_TOP_BITS;

/// Initial probability value (50% = 1024).
pub const INITIAL_PROB: u16 = (BIT_MODEL_TOTAL / 2) as u16;

/// Most input bytes a single LZMA symbol can consume.
///
/// A match with the longest distance reads 20 bytes; one more covers the
/// normalization after the last symbol of a chunk.
pub const LZMA_IN_REQUIRED: usize = 21;

/// Bytes consumed by range decoder initialization.
pub const RC_INIT_BYTES: u32 = 5;

/// Input window for the range decoder.
///
/// `limit` is the last position at which a new symbol may start.
#[derive(Debug)]
pub struct RcInput<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> RcInput<'a> {
    /// Creates a window over `buf` that stops starting symbols after `limit`.
    pub fn new(buf: &'a [u8], limit: usize) -> Self {
        Self { buf, pos: 0, limit }
    }

    /// Returns the number of bytes read so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns `true` once the position has moved past the limit.
    pub fn limit_reached(&self) -> bool {
        self.pos > self.limit
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let byte = self.buf.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }
}

/// LZMA range decoder.
///
/// Holds only the arithmetic state; the input is passed to every call so
/// the decoder can be suspended between calls without borrowing anything.
#[derive(Debug, Clone)]
pub struct RangeDecoder {
    range: u32,
    code: u32,
    init_bytes_left: u32,
}

impl RangeDecoder {
    /// Creates a decoder that still needs its five initialization bytes.
    pub fn new() -> Self {
        Self {
            range: 0xFFFF_FFFF,
            code: 0,
            init_bytes_left: RC_INIT_BYTES,
        }
    }

    /// Returns the decoder to the state before initialization.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Reads initialization bytes from `input`.
    ///
    /// Returns `true` once all five bytes have been read. Can be called
    /// repeatedly while input arrives piecemeal.
    pub fn read_init(&mut self, input: &mut crate::streaming::InputCursor<'_>) -> bool {
        while self.init_bytes_left > 0 {
            let Some(byte) = input.read_byte() else {
                return false;
            };
            self.code = (self.code << 8) | u32::from(byte);
            self.init_bytes_left -= 1;
        }
        true
    }

    /// Returns `true` if the encoder flushed cleanly at this point.
    ///
    /// A well-formed LZMA chunk leaves `code` at zero after its last symbol.
    pub fn is_finished(&self) -> bool {
        self.code == 0
    }

    /// Normalizes the range, reading one byte if needed.
    #[inline]
    pub fn normalize(&mut self, rc: &mut RcInput<'_>) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.code = (self.code << 8) | u32::from(rc.next_byte());
        }
    }

    /// Decodes a single bit with adaptive probability.
    ///
    /// Returns 0 or 1 and updates the probability toward the decoded value.
    #[inline]
    pub fn decode_bit(&mut self, prob: &mut u16, rc: &mut RcInput<'_>) -> u32 {
        self.normalize(rc);
        let p = u32::from(*prob);
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * p;

        if self.code < bound {
            self.range = bound;
            *prob += ((BIT_MODEL_TOTAL - p) >> NUM_MOVE_BITS) as u16;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> NUM_MOVE_BITS;
            1
        }
    }

    /// Decodes a symbol from a bit tree (most significant bit first).
    ///
    /// `probs` must hold at least `1 << num_bits` entries; index 0 is unused.
    pub fn decode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32, rc: &mut RcInput<'_>) -> u32 {
        let mut m = 1u32;
        for _ in 0..num_bits {
            m = (m << 1) | self.decode_bit(&mut probs[m as usize], rc);
        }
        m - (1 << num_bits)
    }

    /// Decodes a symbol from a reverse bit tree (least significant bit first).
    ///
    /// Node `m` of the tree lives at `probs[m - 1]`, so `probs` must hold at
    /// least `(1 << num_bits) - 1` entries.
    pub fn decode_reverse_bit_tree(
        &mut self,
        probs: &mut [u16],
        num_bits: u32,
        rc: &mut RcInput<'_>,
    ) -> u32 {
        let mut m = 1u32;
        let mut symbol = 0u32;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[m as usize - 1], rc);
            m = (m << 1) | bit;
            symbol |= bit << i;
        }
        symbol
    }

    /// Decodes bits with fixed 50% probability (most significant first).
    pub fn decode_direct_bits(&mut self, num_bits: u32, rc: &mut RcInput<'_>) -> u32 {
        let mut value = 0u32;
        for _ in 0..num_bits {
            self.normalize(rc);
            self.range >>= 1;
            self.code = self.code.wrapping_sub(self.range);
            // All ones if the subtraction wrapped, meaning the bit was 0.
            let mask = 0u32.wrapping_sub(self.code >> 31);
            self.code = self.code.wrapping_add(self.range & mask);
            value = (value << 1).wrapping_add(mask.wrapping_add(1));
        }
        value
    }
}

impl Default for RangeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes a probability array to INITIAL_PROB.
pub fn init_probs(probs: &mut [u16]) {
    probs.fill(INITIAL_PROB);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::InputCursor;

    /// Minimal range encoder used to produce decoder input.
    struct TestEncoder {
        range: u32,
        low: u64,
        cache: u8,
        cache_size: u32,
        output: Vec<u8>,
    }

    impl TestEncoder {
        fn new() -> Self {
            Self {
                range: 0xFFFF_FFFF,
                low: 0,
                cache: 0,
                cache_size: 1,
                output: Vec::new(),
            }
        }

        fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
            let p = u32::from(*prob);
            let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * p;
            if bit == 0 {
                self.range = bound;
                *prob += ((BIT_MODEL_TOTAL - p) >> NUM_MOVE_BITS) as u16;
            } else {
                self.low += u64::from(bound);
                self.range -= bound;
                *prob -= *prob >> NUM_MOVE_BITS;
            }
            self.normalize();
        }

        fn encode_direct_bits(&mut self, value: u32, num_bits: u32) {
            for i in (0..num_bits).rev() {
                self.range >>= 1;
                if (value >> i) & 1 == 1 {
                    self.low += u64::from(self.range);
                }
                self.normalize();
            }
        }

        fn normalize(&mut self) {
            while self.range < TOP_VALUE {
                self.range <<= 8;
                self.shift_low();
            }
        }

        fn shift_low(&mut self) {
            if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
                let carry = (self.low >> 32) as u8;
                let mut temp = self.cache;
                loop {
                    self.output.push(temp.wrapping_add(carry));
                    temp = 0xFF;
                    self.cache_size -= 1;
                    if self.cache_size == 0 {
                        break;
                    }
                }
                self.cache = (self.low >> 24) as u8;
            }
            self.cache_size += 1;
            self.low = (self.low & 0x00FF_FFFF) << 8;
        }

        fn finish(mut self) -> Vec<u8> {
            for _ in 0..5 {
                self.shift_low();
            }
            self.output
        }
    }

    fn start_decoder(data: &[u8]) -> (RangeDecoder, usize) {
        let mut rc = RangeDecoder::new();
        let mut input = InputCursor::new(data);
        assert!(rc.read_init(&mut input));
        (rc, input.position())
    }

    #[test]
    fn test_bits_roundtrip() {
        let bits = [0u32, 1, 1, 0, 1, 0, 0, 0, 1, 1, 1, 1, 0, 1];
        let mut enc = TestEncoder::new();
        let mut prob = INITIAL_PROB;
        for &bit in &bits {
            enc.encode_bit(&mut prob, bit);
        }
        let data = enc.finish();

        let (mut rc, start) = start_decoder(&data);
        let mut input = RcInput::new(&data[start..], data.len());
        let mut prob = INITIAL_PROB;
        let decoded: Vec<u32> = bits.iter().map(|_| rc.decode_bit(&mut prob, &mut input)).collect();
        assert_eq!(decoded, bits);
    }

    #[test]
    fn test_bit_trees_and_direct_bits() {
        let mut enc = TestEncoder::new();
        let mut tree = [INITIAL_PROB; 8];
        let mut rev = [INITIAL_PROB; 15];

        // Forward tree, symbol 5 over 3 bits.
        let mut m = 1usize;
        for i in (0..3).rev() {
            let bit = (5 >> i) & 1;
            enc.encode_bit(&mut tree[m], bit);
            m = (m << 1) | bit as usize;
        }
        // Reverse tree, symbol 10 over 4 bits.
        let mut m = 1usize;
        for i in 0..4 {
            let bit = (10 >> i) & 1;
            enc.encode_bit(&mut rev[m - 1], bit);
            m = (m << 1) | bit as usize;
        }
        enc.encode_direct_bits(0x1234, 16);
        let data = enc.finish();

        let (mut rc, start) = start_decoder(&data);
        let mut input = RcInput::new(&data[start..], data.len());
        let mut tree = [INITIAL_PROB; 8];
        let mut rev = [INITIAL_PROB; 15];
        assert_eq!(rc.decode_bit_tree(&mut tree, 3, &mut input), 5);
        assert_eq!(rc.decode_reverse_bit_tree(&mut rev, 4, &mut input), 10);
        assert_eq!(rc.decode_direct_bits(16, &mut input), 0x1234);
    }

    #[test]
    fn test_read_init_across_calls() {
        let data = [0u8, 0x12, 0x34, 0x56, 0x78];
        let mut rc = RangeDecoder::new();

        let mut first = InputCursor::new(&data[..2]);
        assert!(!rc.read_init(&mut first));
        let mut second = InputCursor::new(&data[2..]);
        assert!(rc.read_init(&mut second));
        assert!(!rc.is_finished());
        assert_eq!(second.position(), 3);
    }

    #[test]
    fn test_reads_past_window_are_zero() {
        let mut input = RcInput::new(&[0xAB], 0);
        assert_eq!(input.next_byte(), 0xAB);
        assert!(input.limit_reached());
        assert_eq!(input.next_byte(), 0);
        assert_eq!(input.position(), 2);
    }

    #[test]
    fn test_init_probs() {
        let mut probs = [0u16; 100];
        init_probs(&mut probs);
        assert!(probs.iter().all(|&p| p == INITIAL_PROB));
    }
}
