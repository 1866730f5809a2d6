//! SML escape framing ("boxing").
//!
//! A transmission is `1B1B1B1B 01010101 <messages> <pad> 1B1B1B1B 1A pp
//! c1 c2`. Any literal `1B1B1B1B` inside the message bytes is doubled on
//! the wire. `pp` counts the zero pad bytes that align the stream to four
//! bytes; the CRC-16 trailer covers everything from the first escape byte
//! through `pp` and is stored big-endian.

use bytes::{BufMut, Bytes, BytesMut};
use smgw_crypto::crc16_x25;

use super::SmlError;

/// The escape sequence.
pub const ESCAPE: [u8; 4] = [0x1B, 0x1B, 0x1B, 0x1B];
/// Version marker following the opening escape.
pub const VERSION_1: [u8; 4] = [0x01, 0x01, 0x01, 0x01];
/// Trailer marker byte.
pub const END_MARKER: u8 = 0x1A;

/// Box encoded messages into one framed transmission.
#[must_use]
pub fn boxing(messages: &[Bytes]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_slice(&ESCAPE);
    out.put_slice(&VERSION_1);

    let mut run = 0usize;
    for message in messages {
        for &byte in message.iter() {
            out.put_u8(byte);
            if byte == 0x1B {
                run += 1;
                if run == 4 {
                    // Escape the escape: double the sequence
                    out.put_slice(&ESCAPE);
                    run = 0;
                }
            } else {
                run = 0;
            }
        }
    }

    let pad = (4 - out.len() % 4) % 4;
    for _ in 0..pad {
        out.put_u8(0x00);
    }

    out.put_slice(&ESCAPE);
    out.put_u8(END_MARKER);
    out.put_u8(pad as u8);

    let crc = crc16_x25(&out);
    out.put_u16(crc);
    out.freeze()
}

/// A parsed transmission: raw message bytes and total frame length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unboxed {
    /// Concatenated message bytes with escapes resolved and pad removed.
    pub payload: Vec<u8>,
    /// Number of bytes the frame occupied in the input.
    pub consumed: usize,
}

/// Try to unbox one transmission from the start of `buf`.
///
/// Returns `Ok(None)` while the frame is still incomplete.
pub fn unboxing(buf: &[u8]) -> Result<Option<Unboxed>, SmlError> {
    if buf.len() < 8 {
        return Ok(None);
    }
    if buf[..4] != ESCAPE {
        return Err(SmlError::Framing("missing opening escape"));
    }
    if buf[4..8] != VERSION_1 {
        return Err(SmlError::Framing("unknown framing version"));
    }

    let mut payload = Vec::new();
    let mut pos = 8usize;
    loop {
        let Some(&byte) = buf.get(pos) else {
            return Ok(None);
        };
        if byte == 0x1B && buf[pos..].len() >= 4 && buf[pos..pos + 4] == ESCAPE {
            // Escaped escape or trailer
            let Some(&next) = buf.get(pos + 4) else {
                return Ok(None);
            };
            if next == 0x1B {
                if buf.len() < pos + 8 {
                    return Ok(None);
                }
                if buf[pos + 4..pos + 8] != ESCAPE {
                    return Err(SmlError::Framing("broken escaped escape sequence"));
                }
                payload.extend_from_slice(&ESCAPE);
                pos += 8;
                continue;
            }
            if next == END_MARKER {
                if buf.len() < pos + 8 {
                    return Ok(None);
                }
                let pad = usize::from(buf[pos + 5]);
                let carried = u16::from_be_bytes([buf[pos + 6], buf[pos + 7]]);
                let calculated = crc16_x25(&buf[..pos + 6]);
                if carried != calculated {
                    return Err(SmlError::Crc { calculated, carried });
                }
                if pad > 3 || pad > payload.len() {
                    return Err(SmlError::Framing("implausible pad count"));
                }
                payload.truncate(payload.len() - pad);
                return Ok(Some(Unboxed { payload, consumed: pos + 8 }));
            }
            return Err(SmlError::Framing("unknown escape control byte"));
        }
        if byte == 0x1B && buf[pos..].len() < 4 {
            // Might be the start of an escape crossing the buffer edge
            return Ok(None);
        }
        payload.push(byte);
        pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transmission() {
        let framed = boxing(&[]);
        // Prologue and trailer only, already 4-byte aligned
        assert_eq!(framed.len(), 16);
        let unboxed = unboxing(&framed).unwrap().unwrap();
        assert!(unboxed.payload.is_empty());
        assert_eq!(unboxed.consumed, framed.len());
    }

    #[test]
    fn pad_is_stripped() {
        let framed = boxing(&[Bytes::from_static(&[0x76, 0x01, 0x00])]);
        assert_eq!(framed.len() % 4, 0);
        let unboxed = unboxing(&framed).unwrap().unwrap();
        assert_eq!(unboxed.payload, vec![0x76, 0x01, 0x00]);
    }

    #[test]
    fn escape_inside_payload_round_trips() {
        let tricky = Bytes::from_static(&[0x1B, 0x1B, 0x1B, 0x1B, 0x42]);
        let framed = boxing(&[tricky.clone()]);
        let unboxed = unboxing(&framed).unwrap().unwrap();
        assert_eq!(unboxed.payload, tricky.to_vec());
    }

    #[test]
    fn incomplete_frame_waits() {
        let framed = boxing(&[Bytes::from_static(&[0x76, 0x01])]);
        assert_eq!(unboxing(&framed[..framed.len() - 3]).unwrap(), None);
    }

    #[test]
    fn damaged_trailer_crc_is_rejected() {
        let framed = boxing(&[Bytes::from_static(&[0x76, 0x01])]);
        let mut damaged = framed.to_vec();
        let last = damaged.len() - 1;
        damaged[last] ^= 0xFF;
        assert!(matches!(unboxing(&damaged), Err(SmlError::Crc { .. })));
    }
}
