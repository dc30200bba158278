//! Fuzz target for commit payload parsing.
//!
//! Arbitrary bytes must produce a commit or a parse error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use plumbline_parse::{CommitParser, RecordParser};

fuzz_target!(|data: &[u8]| {
    let _ = CommitParser::new().parse_complete(data);
});
