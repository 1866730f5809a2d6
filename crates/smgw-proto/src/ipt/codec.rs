//! IP-T frame codec.
//!
//! `len:u32 LE | cmd:u16 LE | seq:u8 | 0x00 | body[len-8]`. The length
//! field covers the whole frame, so an empty body encodes as `len = 8`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Command, Header, IptError};

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 8;

/// Upper bound a frame may announce (1 MiB).
///
/// IP-T traffic is meter telegrams and configuration trees; anything
/// larger than this is a framing error or a scrambling mismatch.
pub const MAX_FRAME_SIZE: u32 = 0x0010_0000;

/// Encode one frame.
#[must_use]
pub fn encode_frame(command: Command, sequence: u8, body: &[u8]) -> Bytes {
    let len = (HEADER_SIZE + body.len()) as u32;
    let mut out = BytesMut::with_capacity(len as usize);
    out.put_u32_le(len);
    out.put_u16_le(command.to_u16());
    out.put_u8(sequence);
    out.put_u8(0x00);
    out.put_slice(body);
    out.freeze()
}

/// Streaming frame decoder.
///
/// Feed arbitrary chunks with [`FrameReader::push`]; complete frames come
/// out of [`FrameReader::next`] in order. A length-field violation is
/// unrecoverable for the stream — the reader reports it once and drops
/// all buffered data, the session is expected to close.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
    poisoned: bool,
}

impl FrameReader {
    /// Fresh reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        if !self.poisoned {
            self.buf.extend_from_slice(bytes);
        }
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.buf.clear();
    }
}

impl Iterator for FrameReader {
    type Item = Result<(Header, Bytes), IptError>;

    /// Next complete frame.
    ///
    /// `None` means the buffered data is exhausted; pushing more bytes
    /// can yield further frames.
    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned || self.buf.len() < HEADER_SIZE {
            return None;
        }
        let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if len < HEADER_SIZE as u32 {
            self.poison();
            return Some(Err(IptError::LengthTooSmall(len)));
        }
        if len > MAX_FRAME_SIZE {
            self.poison();
            return Some(Err(IptError::LengthTooLarge(len)));
        }
        let len = len as usize;
        if self.buf.len() < len {
            return None;
        }

        let mut frame = self.buf.split_to(len);
        frame.advance(4);
        let raw_command = frame.get_u16_le();
        let sequence = frame.get_u8();
        frame.advance(1); // reserved
        let header =
            Header { command: Command::from_u16(raw_command), raw_command, sequence };
        Some(Ok((header, frame.freeze())))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_body_frame() {
        let wire = encode_frame(Command::CtrlReqWatchdog, 7, &[]);
        assert_eq!(wire.len(), HEADER_SIZE);
        assert_eq!(&wire[..4], &8u32.to_le_bytes());

        let mut reader = FrameReader::new();
        reader.push(&wire);
        let (header, body) = reader.next().unwrap().unwrap();
        assert_eq!(header.command, Command::CtrlReqWatchdog);
        assert_eq!(header.sequence, 7);
        assert!(body.is_empty());
    }

    #[test]
    fn undersized_length_poisons_the_reader() {
        let mut reader = FrameReader::new();
        reader.push(&[0x04, 0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x00]);
        assert!(matches!(reader.next(), Some(Err(IptError::LengthTooSmall(4)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn oversized_length_poisons_the_reader() {
        let mut reader = FrameReader::new();
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_le_bytes());
        wire.extend_from_slice(&[0x01, 0x40, 0x01, 0x00]);
        reader.push(&wire);
        assert!(matches!(reader.next(), Some(Err(IptError::LengthTooLarge(_)))));
    }

    #[test]
    fn frames_split_across_chunks() {
        let first = encode_frame(Command::CtrlReqLoginPublic, 1, b"user\0pwd\0");
        let second = encode_frame(Command::CtrlReqWatchdog, 2, &[]);
        let mut stream = first.to_vec();
        stream.extend_from_slice(&second);

        let mut reader = FrameReader::new();
        for chunk in stream.chunks(5) {
            reader.push(chunk);
        }

        let (h1, b1) = reader.next().unwrap().unwrap();
        assert_eq!(h1.command, Command::CtrlReqLoginPublic);
        assert_eq!(b1.as_ref(), b"user\0pwd\0");
        let (h2, _) = reader.next().unwrap().unwrap();
        assert_eq!(h2.sequence, 2);
        assert!(reader.next().is_none());
    }

    proptest! {
        #[test]
        fn frame_round_trip(seq in any::<u8>(), body in proptest::collection::vec(any::<u8>(), 0..512)) {
            let wire = encode_frame(Command::TpReqPushdataTransfer, seq, &body);
            let mut reader = FrameReader::new();
            reader.push(&wire);
            let (header, decoded) = reader.next().unwrap().unwrap();
            prop_assert_eq!(header.command, Command::TpReqPushdataTransfer);
            prop_assert_eq!(header.sequence, seq);
            prop_assert_eq!(decoded.as_ref(), body.as_slice());
        }
    }
}
