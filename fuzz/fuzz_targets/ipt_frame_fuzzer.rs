//! Fuzz target for the IP-T frame reader.
//!
//! # Invariants
//!
//! - Arbitrary chunked bytes never panic the reader
//! - Decoded frames re-encode to the same wire bytes

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use smgw_proto::ipt::codec::encode_frame;
use smgw_proto::ipt::FrameReader;

#[derive(Debug, Arbitrary)]
struct Input {
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let mut reader = FrameReader::new();
    for chunk in &input.chunks {
        reader.push(chunk);
    }
    while let Some(item) = reader.next() {
        let Ok((header, body)) = item else {
            break;
        };
        // Round trip: header fields plus body reproduce a valid frame
        let wire = encode_frame(header.command, header.sequence, &body);
        let mut check = FrameReader::new();
        check.push(&wire);
        let (again, body_again) = check
            .next()
            .expect("re-encoded frame must parse")
            .expect("re-encoded frame must be valid");
        assert_eq!(again.sequence, header.sequence);
        assert_eq!(body_again, body);
    }
});
