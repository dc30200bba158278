//! Fuzz target for porcelain v2 status parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use plumbline_parse::{RecordReader, StatusParser};

fuzz_target!(|data: &[u8]| {
    // Small chunks exercise record boundaries that straddle reads.
    let _ = RecordReader::new(data)
        .with_chunk_size(7)
        .read_to_end(StatusParser::new());
});
