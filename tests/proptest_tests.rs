//! Property-based tests using proptest.
//!
//! These tests check that decoding does not depend on how the input and
//! output are split into windows, and that damaged input always ends in an
//! error value.

mod common;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{XzBuilder, decode_scheduled, fixture};
use xzstream::{DecoderConfig, Error, decompress};

/// Decodes with window sizes drawn from a seeded generator.
fn decode_random_windows(
    data: &[u8],
    config: &DecoderConfig,
    seed: u64,
    max_in: usize,
    max_out: usize,
) -> xzstream::Result<Vec<u8>> {
    let mut in_rng = StdRng::seed_from_u64(seed);
    let mut out_rng = StdRng::seed_from_u64(seed ^ 0x5A5A);
    decode_scheduled(
        data,
        config,
        || in_rng.gen_range(1..=max_in),
        || out_rng.gen_range(1..=max_out),
    )
    .map(|d| d.data)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Output is independent of the window schedule.
    #[test]
    fn chunking_invariance_lorem(seed in any::<u64>(), max_in in 1usize..600, max_out in 1usize..900) {
        let data = fixture("lorem-blocks.xz");
        let plain = decode_random_windows(&data, &DecoderConfig::default(), seed, max_in, max_out).unwrap();
        prop_assert!(plain == fixture("lorem.txt"));
    }

    /// Filter chains keep their state across arbitrary windows.
    #[test]
    fn chunking_invariance_filter_chain(seed in any::<u64>(), max_in in 1usize..300, max_out in 1usize..40) {
        let data = fixture("branches-chain.xz");
        let plain = decode_random_windows(&data, &DecoderConfig::default(), seed, max_in, max_out).unwrap();
        prop_assert!(plain == fixture("branches.bin"));
    }

    /// Concatenated streams with padding decode the same for any schedule.
    #[test]
    fn chunking_invariance_concatenated(
        blocks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..300), 1..4),
        padding in 0usize..4,
        seed in any::<u64>(),
    ) {
        let mut builder = XzBuilder::new(0x04);
        for block in &blocks {
            builder = builder.block(block);
        }
        let stream = builder.build();

        let mut data = stream.clone();
        data.extend(std::iter::repeat_n(0u8, padding * 4));
        data.extend_from_slice(&stream);

        let expected: Vec<u8> = blocks.concat().repeat(2);
        let config = DecoderConfig::new().concatenated(true);
        let plain = decode_random_windows(&data, &config, seed, 50, 50).unwrap();
        prop_assert_eq!(plain, expected);
    }

    /// Every proper prefix is reported as truncated.
    #[test]
    fn truncation_detected(cut in 0usize..5340) {
        let data = fixture("lorem-crc32.xz");
        let cut = cut.min(data.len() - 1);
        let err = decompress(&data[..cut], &DecoderConfig::default()).unwrap_err();
        prop_assert!(matches!(err, Error::Truncated(_)), "cut at {} gave {:?}", cut, err);
    }

    /// Damaged input never panics and never trips an internal invariant.
    #[test]
    fn corruption_is_an_error_value(pos in any::<prop::sample::Index>(), xor in 1u8..=255, seed in any::<u64>()) {
        let mut data = fixture("mixed.xz");
        let pos = pos.index(data.len());
        data[pos] ^= xor;

        let config = DecoderConfig::new().memory_limit(8 << 20);
        match decode_random_windows(&data, &config, seed, 4096, 4096) {
            Ok(plain) => prop_assert_eq!(plain.len(), 200_000, "sizes are covered by the index"),
            Err(err) => prop_assert!(!err.is_invariant_violation(), "{:?}", err),
        }
    }

    /// Arbitrary bytes are rejected cleanly.
    #[test]
    fn arbitrary_bytes_rejected(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        if let Err(err) = decompress(&data, &DecoderConfig::fuzzing()) {
            prop_assert!(!err.is_invariant_violation(), "{:?}", err);
        }
    }
}
