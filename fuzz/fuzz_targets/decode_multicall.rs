//! Fuzz target driving the decoder by hand across many calls.
//!
//! The first input byte picks the window sizes. Once the whole input has
//! been offered the target switches to `Action::Finish` and then checks
//! that a finished or failed session stays that way.
//!
//! Run with: cargo +nightly fuzz run decode_multicall

#![no_main]

use libfuzzer_sys::fuzz_target;
use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};

fuzz_target!(|data: &[u8]| {
    let Some((&shape, data)) = data.split_first() else {
        return;
    };
    let in_step = usize::from(shape & 0x0F) + 1;
    let out_step = usize::from(shape >> 4) * 16 + 1;

    let Ok(mut decoder) = StreamDecoder::new(DecoderConfig::fuzzing()) else {
        return;
    };
    let mut pos = 0;
    let mut finishing = false;
    let mut out = vec![0u8; out_step];
    let mut produced = 0u64;

    let failed = loop {
        let end = if finishing {
            data.len()
        } else {
            (pos + in_step).min(data.len())
        };
        finishing = end == data.len();
        let action = if finishing { Action::Finish } else { Action::Run };

        let mut input = InputCursor::new(&data[pos..end]);
        let mut output = OutputCursor::new(&mut out);
        let result = decoder.decode(&mut input, &mut output, action);
        pos += input.position();
        produced += output.position() as u64;

        match result {
            Ok(Status::StreamEnd) if finishing && pos == data.len() => break false,
            Ok(_) => {}
            Err(err) => {
                assert!(!err.is_invariant_violation(), "{:?}", err);
                break true;
            }
        }
    };

    assert_eq!(decoder.total_in(), pos as u64);
    assert_eq!(decoder.total_out(), produced);

    // A failed session keeps failing; a finished one keeps ending.
    let mut input = InputCursor::new(&data[pos..]);
    let mut output = OutputCursor::new(&mut out);
    let again = decoder.decode(&mut input, &mut output, Action::Finish);
    if failed {
        assert!(again.is_err());
    } else {
        assert_eq!(again.ok(), Some(Status::StreamEnd));
    }
});
