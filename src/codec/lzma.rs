//! LZMA symbol decoder.
//!
//! This module implements the probability model and symbol decoding for:
//! - Literal bytes (plain and matched, with context from the previous byte)
//! - Match lengths (using length decoder trees)
//! - Match distances (using slot, reverse tree and alignment decoding)
//! - State machine transitions (12 states)
//!
//! The chunk framing around it lives in [`super::lzma2`].

use super::dict::Dictionary;
use super::lzma_rc::{INITIAL_PROB, RangeDecoder, RcInput, init_probs};
use crate::{Error, Result};

// LZMA Constants
const NUM_REPS: usize = 4;
const NUM_STATES: usize = 12;
const LIT_STATES: usize = 7;

// Position state constants
const NUM_POS_BITS_MAX: usize = 4;
const NUM_POS_STATES_MAX: usize = 1 << NUM_POS_BITS_MAX;

// Literal coder constants
const LITERAL_CODER_SIZE: usize = 0x300;
const LITERAL_CODERS_MAX: usize = 1 << 4;

// Length decoding constants
const LEN_NUM_LOW_BITS: u32 = 3;
const LEN_NUM_LOW_SYMBOLS: usize = 1 << LEN_NUM_LOW_BITS;
const LEN_NUM_MID_BITS: u32 = 3;
const LEN_NUM_MID_SYMBOLS: usize = 1 << LEN_NUM_MID_BITS;
const LEN_NUM_HIGH_BITS: u32 = 8;
const LEN_NUM_HIGH_SYMBOLS: usize = 1 << LEN_NUM_HIGH_BITS;

const MATCH_LEN_MIN: u32 = 2;

// Distance decoding constants
const NUM_LEN_TO_POS_STATES: usize = 4;
const NUM_POS_SLOT_BITS: u32 = 6;
const NUM_ALIGN_BITS: u32 = 4;
const ALIGN_TABLE_SIZE: usize = 1 << NUM_ALIGN_BITS;

const START_POS_MODEL_INDEX: u32 = 4;
const END_POS_MODEL_INDEX: u32 = 14;
const NUM_FULL_DISTANCES: usize = 1 << (END_POS_MODEL_INDEX / 2);

// State transitions
const LIT_NEXT_STATES: [usize; NUM_STATES] = [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 4, 5];
const MATCH_NEXT_STATES: [usize; NUM_STATES] = [7, 7, 7, 7, 7, 7, 7, 10, 10, 10, 10, 10];
const REP_NEXT_STATES: [usize; NUM_STATES] = [8, 8, 8, 8, 8, 8, 8, 11, 11, 11, 11, 11];
const SHORT_REP_NEXT_STATES: [usize; NUM_STATES] = [9, 9, 9, 9, 9, 9, 9, 11, 11, 11, 11, 11];

/// Literal context, literal position and position bit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProps {
    /// Literal context bits (0-4 in LZMA2).
    pub lc: u32,
    /// Literal position bits (0-4).
    pub lp: u32,
    /// Position bits (0-4).
    pub pb: u32,
}

impl LzmaProps {
    /// Decodes the `(pb * 5 + lp) * 9 + lc` properties byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for values above 224 or when `lc + lp > 4`,
    /// which LZMA2 forbids.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte > (4 * 5 + 4) * 9 + 8 {
            return Err(Error::corrupt(0, format!("invalid LZMA properties byte {:#04x}", byte)));
        }
        let byte = u32::from(byte);
        let props = Self {
            lc: byte % 9,
            lp: (byte / 9) % 5,
            pb: byte / 45,
        };
        if props.lc + props.lp > 4 {
            return Err(Error::corrupt(
                0,
                format!("LZMA2 requires lc + lp <= 4 (lc={}, lp={})", props.lc, props.lp),
            ));
        }
        Ok(props)
    }
}

impl Default for LzmaProps {
    fn default() -> Self {
        Self { lc: 3, lp: 0, pb: 2 }
    }
}

/// Length decoder for match and rep lengths.
///
/// Uses a 3-tree structure:
/// - Low tree: lengths 2-9
/// - Mid tree: lengths 10-17
/// - High tree: lengths 18-273
#[derive(Debug, Clone)]
struct LengthDecoder {
    choice: u16,
    choice2: u16,
    low: [[u16; LEN_NUM_LOW_SYMBOLS]; NUM_POS_STATES_MAX],
    mid: [[u16; LEN_NUM_MID_SYMBOLS]; NUM_POS_STATES_MAX],
    high: [u16; LEN_NUM_HIGH_SYMBOLS],
}

impl LengthDecoder {
    fn new() -> Self {
        Self {
            choice: INITIAL_PROB,
            choice2: INITIAL_PROB,
            low: [[INITIAL_PROB; LEN_NUM_LOW_SYMBOLS]; NUM_POS_STATES_MAX],
            mid: [[INITIAL_PROB; LEN_NUM_MID_SYMBOLS]; NUM_POS_STATES_MAX],
            high: [INITIAL_PROB; LEN_NUM_HIGH_SYMBOLS],
        }
    }

    fn reset(&mut self) {
        self.choice = INITIAL_PROB;
        self.choice2 = INITIAL_PROB;
        for ps in &mut self.low {
            init_probs(ps);
        }
        for ps in &mut self.mid {
            init_probs(ps);
        }
        init_probs(&mut self.high);
    }

    fn decode(&mut self, rc: &mut RangeDecoder, input: &mut RcInput<'_>, pos_state: usize) -> u32 {
        if rc.decode_bit(&mut self.choice, input) == 0 {
            MATCH_LEN_MIN + rc.decode_bit_tree(&mut self.low[pos_state], LEN_NUM_LOW_BITS, input)
        } else if rc.decode_bit(&mut self.choice2, input) == 0 {
            MATCH_LEN_MIN
                + LEN_NUM_LOW_SYMBOLS as u32
                + rc.decode_bit_tree(&mut self.mid[pos_state], LEN_NUM_MID_BITS, input)
        } else {
            MATCH_LEN_MIN
                + (LEN_NUM_LOW_SYMBOLS + LEN_NUM_MID_SYMBOLS) as u32
                + rc.decode_bit_tree(&mut self.high, LEN_NUM_HIGH_BITS, input)
        }
    }
}

/// LZMA decoder state with all probability arrays.
///
/// A match can be longer than the room left before the dictionary limit;
/// the remainder is kept in `len` and copied first on the next call.
#[derive(Debug, Clone)]
pub struct LzmaDecoder {
    lc: u32,
    literal_pos_mask: usize,
    pos_mask: usize,

    // State machine (0-11)
    state: usize,

    // Last 4 repetition distances
    reps: [u32; NUM_REPS],

    // Match bytes still to copy
    len: u32,

    is_match: [[u16; NUM_POS_STATES_MAX]; NUM_STATES],
    is_rep: [u16; NUM_STATES],
    is_rep_g0: [u16; NUM_STATES],
    is_rep_g1: [u16; NUM_STATES],
    is_rep_g2: [u16; NUM_STATES],
    is_rep0_long: [[u16; NUM_POS_STATES_MAX]; NUM_STATES],

    // Sized for the largest lc + lp so a props change never reallocates.
    literal_probs: Vec<u16>,

    dist_slot: [[u16; 1 << NUM_POS_SLOT_BITS]; NUM_LEN_TO_POS_STATES],
    dist_special: [u16; NUM_FULL_DISTANCES - END_POS_MODEL_INDEX as usize],
    dist_align: [u16; ALIGN_TABLE_SIZE],

    match_len: LengthDecoder,
    rep_len: LengthDecoder,
}

impl LzmaDecoder {
    /// Bytes of heap memory held besides the struct itself.
    pub const HEAP_SIZE: usize = LITERAL_CODERS_MAX * LITERAL_CODER_SIZE * size_of::<u16>();

    /// Creates a decoder with default properties and all probabilities reset.
    pub fn new() -> Self {
        let props = LzmaProps::default();
        Self {
            lc: props.lc,
            literal_pos_mask: (1 << props.lp) - 1,
            pos_mask: (1 << props.pb) - 1,
            state: 0,
            reps: [0; NUM_REPS],
            len: 0,
            is_match: [[INITIAL_PROB; NUM_POS_STATES_MAX]; NUM_STATES],
            is_rep: [INITIAL_PROB; NUM_STATES],
            is_rep_g0: [INITIAL_PROB; NUM_STATES],
            is_rep_g1: [INITIAL_PROB; NUM_STATES],
            is_rep_g2: [INITIAL_PROB; NUM_STATES],
            is_rep0_long: [[INITIAL_PROB; NUM_POS_STATES_MAX]; NUM_STATES],
            literal_probs: vec![INITIAL_PROB; LITERAL_CODERS_MAX * LITERAL_CODER_SIZE],
            dist_slot: [[INITIAL_PROB; 1 << NUM_POS_SLOT_BITS]; NUM_LEN_TO_POS_STATES],
            dist_special: [INITIAL_PROB; NUM_FULL_DISTANCES - END_POS_MODEL_INDEX as usize],
            dist_align: [INITIAL_PROB; ALIGN_TABLE_SIZE],
            match_len: LengthDecoder::new(),
            rep_len: LengthDecoder::new(),
        }
    }

    /// Applies new lc/lp/pb values and resets the state.
    pub fn set_props(&mut self, props: LzmaProps) {
        self.lc = props.lc;
        self.literal_pos_mask = (1 << props.lp) - 1;
        self.pos_mask = (1 << props.pb) - 1;
        self.reset();
    }

    /// Resets the state machine, distances and probabilities.
    pub fn reset(&mut self) {
        self.state = 0;
        self.reps = [0; NUM_REPS];
        self.len = 0;

        for row in &mut self.is_match {
            init_probs(row);
        }
        init_probs(&mut self.is_rep);
        init_probs(&mut self.is_rep_g0);
        init_probs(&mut self.is_rep_g1);
        init_probs(&mut self.is_rep_g2);
        for row in &mut self.is_rep0_long {
            init_probs(row);
        }
        init_probs(&mut self.literal_probs);
        for row in &mut self.dist_slot {
            init_probs(row);
        }
        init_probs(&mut self.dist_special);
        init_probs(&mut self.dist_align);
        self.match_len.reset();
        self.rep_len.reset();
    }

    /// Returns `true` if part of a match is still waiting to be copied.
    pub fn has_pending_match(&self) -> bool {
        self.len > 0
    }

    /// Decodes symbols into `dict` until it reaches its limit or the input
    /// window is used up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if a match refers to data before the start
    /// of the dictionary.
    pub fn decode(
        &mut self,
        dict: &mut Dictionary,
        rc: &mut RangeDecoder,
        input: &mut RcInput<'_>,
    ) -> Result<()> {
        if dict.has_space() && self.len > 0 {
            dict.repeat(self.reps[0], &mut self.len)?;
        }

        while dict.has_space() && !input.limit_reached() {
            let pos_state = dict.pos() & self.pos_mask;

            if rc.decode_bit(&mut self.is_match[self.state][pos_state], input) == 0 {
                self.decode_literal(dict, rc, input);
                continue;
            }

            if rc.decode_bit(&mut self.is_rep[self.state], input) == 0 {
                self.decode_match(pos_state, rc, input);
            } else {
                self.decode_rep_match(pos_state, rc, input);
            }

            dict.repeat(self.reps[0], &mut self.len)?;
        }

        rc.normalize(input);
        Ok(())
    }

    fn decode_literal(&mut self, dict: &mut Dictionary, rc: &mut RangeDecoder, input: &mut RcInput<'_>) {
        let prev_byte = usize::from(dict.get(0));
        let context = ((dict.pos() & self.literal_pos_mask) << self.lc) + (prev_byte >> (8 - self.lc));
        let base = context * LITERAL_CODER_SIZE;
        let probs = &mut self.literal_probs[base..base + LITERAL_CODER_SIZE];

        let symbol = if self.state < LIT_STATES {
            rc.decode_bit_tree(probs, 8, input)
        } else {
            // After a match: the byte at rep0 steers the probabilities
            // until the first mismatching bit.
            let mut symbol = 1u32;
            let mut match_byte = u32::from(dict.get(self.reps[0])) << 1;
            let mut offset = 0x100u32;
            while symbol < 0x100 {
                let match_bit = match_byte & offset;
                match_byte <<= 1;
                let i = (offset + match_bit + symbol) as usize;
                if rc.decode_bit(&mut probs[i], input) == 0 {
                    symbol <<= 1;
                    offset &= !match_bit;
                } else {
                    symbol = (symbol << 1) | 1;
                    offset &= match_bit;
                }
            }
            symbol - 0x100
        };

        dict.put(symbol as u8);
        self.state = LIT_NEXT_STATES[self.state];
    }

    fn decode_match(&mut self, pos_state: usize, rc: &mut RangeDecoder, input: &mut RcInput<'_>) {
        self.state = MATCH_NEXT_STATES[self.state];
        self.reps[3] = self.reps[2];
        self.reps[2] = self.reps[1];
        self.reps[1] = self.reps[0];

        self.len = self.match_len.decode(rc, input, pos_state);

        let len_state = ((self.len - MATCH_LEN_MIN) as usize).min(NUM_LEN_TO_POS_STATES - 1);
        let slot = rc.decode_bit_tree(&mut self.dist_slot[len_state], NUM_POS_SLOT_BITS, input);

        if slot < START_POS_MODEL_INDEX {
            self.reps[0] = slot;
            return;
        }

        let num_direct_bits = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << num_direct_bits;

        self.reps[0] = if slot < END_POS_MODEL_INDEX {
            // Slot 4 starts at index 0 and every slot's tree follows the
            // previous one, so the tree for `slot` begins at `base - slot`.
            let start = (base - slot) as usize;
            base + rc.decode_reverse_bit_tree(&mut self.dist_special[start..], num_direct_bits, input)
        } else {
            let direct = rc.decode_direct_bits(num_direct_bits - NUM_ALIGN_BITS, input);
            let align = rc.decode_reverse_bit_tree(&mut self.dist_align, NUM_ALIGN_BITS, input);
            base.wrapping_add(direct << NUM_ALIGN_BITS).wrapping_add(align)
        };
    }

    fn decode_rep_match(&mut self, pos_state: usize, rc: &mut RangeDecoder, input: &mut RcInput<'_>) {
        if rc.decode_bit(&mut self.is_rep_g0[self.state], input) == 0 {
            if rc.decode_bit(&mut self.is_rep0_long[self.state][pos_state], input) == 0 {
                self.state = SHORT_REP_NEXT_STATES[self.state];
                self.len = 1;
                return;
            }
        } else {
            let dist = if rc.decode_bit(&mut self.is_rep_g1[self.state], input) == 0 {
                self.reps[1]
            } else {
                let dist = if rc.decode_bit(&mut self.is_rep_g2[self.state], input) == 0 {
                    self.reps[2]
                } else {
                    let dist = self.reps[3];
                    self.reps[3] = self.reps[2];
                    dist
                };
                self.reps[2] = self.reps[1];
                dist
            };
            self.reps[1] = self.reps[0];
            self.reps[0] = dist;
        }

        self.state = REP_NEXT_STATES[self.state];
        self.len = self.rep_len.decode(rc, input, pos_state);
    }
}

impl Default for LzmaDecoder {
    fn default() -> Self {
        Self::new()
    }
}
