//! Fuzz target writing into a stdio-sized output buffer.
//!
//! Run with: cargo +nightly fuzz run decode_bufsize

#![no_main]

use libfuzzer_sys::fuzz_target;
use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};

const BUFSIZ: usize = 8192;

fuzz_target!(|data: &[u8]| {
    let Ok(mut decoder) = StreamDecoder::new(DecoderConfig::fuzzing()) else {
        return;
    };
    let mut input = InputCursor::new(data);
    let mut out = [0u8; BUFSIZ];

    loop {
        let mut output = OutputCursor::new(&mut out);
        match decoder.decode(&mut input, &mut output, Action::Finish) {
            Ok(Status::StreamEnd) if input.is_empty() => break,
            Ok(_) => assert!(input.position() <= data.len()),
            Err(err) => {
                assert!(!err.is_invariant_violation(), "{:?}", err);
                break;
            }
        }
    }
});
