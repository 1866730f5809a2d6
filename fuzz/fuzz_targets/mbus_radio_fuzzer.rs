//! Fuzz target for wireless M-Bus frame parsing and record reading.
//!
//! # Invariants
//!
//! - The radio frame parser never panics and always terminates
//! - The record reader never panics and always advances its offset

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use smgw_mbus::radio::FrameParser;
use smgw_mbus::read_record;

#[derive(Debug, Arbitrary)]
struct Input {
    stream: Vec<u8>,
    records: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut parser = FrameParser::new();
    parser.push(&input.stream);
    while parser.next().is_some() {}

    let mut offset = 0usize;
    while offset < input.records.len() {
        match read_record(&input.records, offset, 1) {
            Ok((next, record)) => {
                assert!(next > offset || record.is_none(), "reader must advance");
                if record.is_none() {
                    break;
                }
                offset = next;
            },
            Err(_) => break,
        }
    }
});
