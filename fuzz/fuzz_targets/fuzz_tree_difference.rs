//! Fuzz target for tree difference parsing.
//!
//! Feeds the input through the streaming reader with a fuzzer-chosen chunk
//! size and checks the result matches a single-chunk parse.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use plumbline_parse::{DiffFormat, RecordReader, TreeDifferenceParser};

#[derive(Debug, Arbitrary)]
struct Input {
    name_status: bool,
    nul_terminated: bool,
    chunk_size: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let format = if input.name_status {
        DiffFormat::NameStatus
    } else {
        DiffFormat::Raw
    };
    let parser = || TreeDifferenceParser::new(format, input.nul_terminated);

    let whole = RecordReader::new(&input.data[..])
        .with_chunk_size(input.data.len().max(1))
        .read_to_end(parser());
    let chunked = RecordReader::new(&input.data[..])
        .with_chunk_size(usize::from(input.chunk_size).max(1))
        .read_to_end(parser());

    if let (Ok(whole), Ok(chunked)) = (whole, chunked) {
        assert_eq!(whole, chunked);
    }
});
