//! Fuzz target feeding 13-byte input windows into 29-byte output windows.
//!
//! Small, coprime window sizes put suspension points inside every header
//! field and every range coder normalization.
//!
//! Run with: cargo +nightly fuzz run decode_chunked

#![no_main]

use libfuzzer_sys::fuzz_target;
use xzstream::{Action, DecoderConfig, Error, InputCursor, OutputCursor, Status, StreamDecoder};

const IN_CHUNK: usize = 13;
const OUT_CHUNK: usize = 29;

fuzz_target!(|data: &[u8]| {
    let Ok(mut decoder) = StreamDecoder::new(DecoderConfig::fuzzing()) else {
        return;
    };
    let mut pos = 0;
    let mut out = [0u8; OUT_CHUNK];

    loop {
        let end = (pos + IN_CHUNK).min(data.len());
        let action = if end == data.len() {
            Action::Finish
        } else {
            Action::Run
        };
        // Under Finish the whole rest must be passed on every call.
        let end = if action == Action::Finish { data.len() } else { end };

        let mut input = InputCursor::new(&data[pos..end]);
        let mut output = OutputCursor::new(&mut out);
        let result = decoder.decode(&mut input, &mut output, action);
        pos += input.position();

        match result {
            Ok(Status::StreamEnd) if pos == data.len() => break,
            Ok(_) => {}
            Err(Error::ProgError(msg)) => panic!("misuse reported: {}", msg),
            Err(err) => {
                assert!(!err.is_invariant_violation(), "{:?}", err);
                break;
            }
        }
    }
});
