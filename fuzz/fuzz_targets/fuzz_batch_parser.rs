//! Fuzz target for `cat-file --batch` response parsing.
//!
//! Tests that header lines and payload framing handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use plumbline_parse::{BatchMode, BatchParser, RecordParser};

fuzz_target!(|data: &[u8]| {
    let _ = BatchParser::new(BatchMode::Contents).parse_complete(data);
    let _ = BatchParser::new(BatchMode::Check).parse_complete(data);
});
