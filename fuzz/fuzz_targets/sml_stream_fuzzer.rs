//! Fuzz target for the SML stream parser.
//!
//! # Strategy
//!
//! - Arbitrary bytes, chunked arbitrarily, through the pull parser
//! - Valid framed transmissions with injected corruption
//!
//! # Invariants
//!
//! - The parser never panics on any input
//! - Every reported message re-encodes without panicking
//! - The parser makes progress: it never yields results forever

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use smgw_proto::sml::SmlParser;

#[derive(Debug, Arbitrary)]
struct Input {
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let mut parser = SmlParser::new();
    let mut budget = 0usize;
    for chunk in &input.chunks {
        budget += chunk.len();
        parser.push(chunk);
    }

    // The parser may report at most one result per consumed byte
    let mut yielded = 0usize;
    while let Some(item) = parser.next() {
        if let Ok(msg) = item {
            let _ = msg.encode();
        }
        yielded += 1;
        assert!(yielded <= budget + 1, "parser yields without consuming");
    }
});
