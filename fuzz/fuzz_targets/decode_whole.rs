//! Fuzz target decoding the whole input in one call sequence.
//!
//! The entire input is available from the first call and the output
//! buffer is large, so most inputs finish in a handful of calls.
//!
//! Run with: cargo +nightly fuzz run decode_whole

#![no_main]

use libfuzzer_sys::fuzz_target;
use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};

const OUT_SIZE: usize = 1 << 20;

fuzz_target!(|data: &[u8]| {
    let config = DecoderConfig::fuzzing().memory_limit(500 << 20);
    let Ok(mut decoder) = StreamDecoder::new(config) else {
        return;
    };
    let mut input = InputCursor::new(data);
    let mut out = vec![0u8; OUT_SIZE];

    loop {
        let mut output = OutputCursor::new(&mut out);
        match decoder.decode(&mut input, &mut output, Action::Finish) {
            Ok(Status::StreamEnd) if input.is_empty() => break,
            Ok(_) => {}
            Err(err) => {
                assert!(!err.is_invariant_violation(), "{:?}", err);
                break;
            }
        }
    }
    decoder.end();
});
