//! Resettable SML stream parser.
//!
//! Feed raw bytes with [`SmlParser::push`], pull decoded messages with
//! [`SmlParser::next`]. The parser accepts both framed transmissions and
//! bare message sequences (the form wireless M-Bus payloads carry after
//! decryption). Malformed data never poisons the stream: the error is
//! reported once and parsing resumes at the next escape sequence or
//! message start.

use std::collections::VecDeque;

use super::framing::{self, ESCAPE};
use super::message::SmlMessage;
use super::value::Decoder;
use super::SmlError;

/// Fill byte found around bare message sequences.
const FILL: u8 = 0x2F;
/// List-of-6 tag every message starts with.
const MESSAGE_START: u8 = 0x76;

/// Pull parser over an SML byte stream.
#[derive(Debug, Default)]
pub struct SmlParser {
    buf: Vec<u8>,
    queue: VecDeque<Result<SmlMessage, SmlError>>,
}

impl SmlParser {
    /// Fresh parser with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all buffered data and pending results.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.queue.clear();
    }

    /// Append stream bytes and decode as far as possible.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.drain();
    }

    fn drain(&mut self) {
        loop {
            // Fill and pad bytes between frames carry no information
            let skip = self.buf.iter().take_while(|&&b| b == FILL || b == 0x00).count();
            self.buf.drain(..skip);

            match self.buf.first() {
                None => return,
                Some(&0x1B) => {
                    if !self.drain_framed() {
                        return;
                    }
                },
                Some(&MESSAGE_START) => {
                    if !self.drain_bare() {
                        return;
                    }
                },
                Some(_) => self.resync(),
            }
        }
    }

    /// Consume one framed transmission. Returns false to wait for more data.
    fn drain_framed(&mut self) -> bool {
        if self.buf.len() < 4 {
            return false;
        }
        if self.buf[..4] != ESCAPE {
            self.resync();
            return true;
        }
        match framing::unboxing(&self.buf) {
            Ok(None) => false,
            Ok(Some(unboxed)) => {
                self.buf.drain(..unboxed.consumed);
                self.decode_payload(&unboxed.payload);
                true
            },
            Err(err) => {
                tracing::debug!("sml framing error: {err}");
                self.queue.push_back(Err(err));
                self.buf.drain(..4);
                self.resync();
                true
            },
        }
    }

    /// Consume bare messages from the buffer head. Returns false to wait.
    fn drain_bare(&mut self) -> bool {
        let mut dec = Decoder::new(&self.buf);
        match SmlMessage::decode(&mut dec) {
            Ok(msg) => {
                let consumed = dec.pos();
                self.queue.push_back(Ok(msg));
                self.buf.drain(..consumed);
                true
            },
            Err(SmlError::Truncated(_)) => false,
            Err(err) => {
                tracing::debug!("sml message error: {err}");
                self.queue.push_back(Err(err));
                self.buf.drain(..1);
                self.resync();
                true
            },
        }
    }

    /// Decode the message sequence inside an unboxed transmission.
    ///
    /// A decode error abandons the remainder of this transmission; the
    /// next frame starts clean.
    fn decode_payload(&mut self, payload: &[u8]) {
        let mut dec = Decoder::new(payload);
        while dec.remaining() > 0 {
            if dec.peek() == Some(0x00) || dec.peek() == Some(FILL) {
                // Pad left inside the message area
                let skipped = payload.len() - dec.pos();
                let all_fill = payload[dec.pos()..].iter().all(|&b| b == 0x00 || b == FILL);
                if all_fill {
                    return;
                }
                self.queue.push_back(Err(SmlError::Garbage { skipped }));
                return;
            }
            match SmlMessage::decode(&mut dec) {
                Ok(msg) => self.queue.push_back(Ok(msg)),
                Err(err) => {
                    tracing::debug!("sml message error inside frame: {err}");
                    self.queue.push_back(Err(err));
                    return;
                },
            }
        }
    }

    /// Drop bytes until the next escape sequence or message start.
    fn resync(&mut self) {
        let skipped = self
            .buf
            .iter()
            .position(|&b| b == 0x1B || b == MESSAGE_START)
            .unwrap_or(self.buf.len());
        if skipped > 0 {
            self.queue.push_back(Err(SmlError::Garbage { skipped }));
            self.buf.drain(..skipped);
        }
    }
}

impl Iterator for SmlParser {
    type Item = Result<SmlMessage, SmlError>;

    /// Next decoded message or recoverable error.
    ///
    /// `None` means the buffered data is exhausted, not that the stream
    /// ended — pushing more bytes can yield further items.
    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::super::message::{CloseRequest, SmlBody};
    use super::*;

    fn close_message(trx: &[u8]) -> SmlMessage {
        SmlMessage::new(
            Bytes::copy_from_slice(trx),
            0,
            0,
            SmlBody::CloseRequest(CloseRequest::default()),
        )
    }

    #[test]
    fn framed_round_trip() {
        let first = close_message(b"77-1");
        let second = close_message(b"77-2");
        let framed = framing::boxing(&[first.encode(), second.encode()]);

        let mut parser = SmlParser::new();
        parser.push(&framed);

        assert_eq!(parser.next().unwrap().unwrap(), first);
        assert_eq!(parser.next().unwrap().unwrap(), second);
        assert!(parser.next().is_none());
    }

    #[test]
    fn chunked_input_is_reassembled() {
        let msg = close_message(b"88-1");
        let framed = framing::boxing(&[msg.encode()]);

        let mut parser = SmlParser::new();
        for chunk in framed.chunks(3) {
            parser.push(chunk);
        }
        assert_eq!(parser.next().unwrap().unwrap(), msg);
    }

    #[test]
    fn bare_messages_with_fill_bytes() {
        let msg = close_message(b"99-1");
        let mut stream = vec![FILL, FILL];
        stream.extend_from_slice(&msg.encode());
        stream.extend_from_slice(&[FILL, FILL, FILL]);

        let mut parser = SmlParser::new();
        parser.push(&stream);
        assert_eq!(parser.next().unwrap().unwrap(), msg);
        assert!(parser.next().is_none());
    }

    #[test]
    fn garbage_is_reported_then_skipped() {
        let msg = close_message(b"11-1");
        let mut stream = vec![0xDE, 0xAD];
        stream.extend_from_slice(&framing::boxing(&[msg.encode()]));

        let mut parser = SmlParser::new();
        parser.push(&stream);

        assert!(matches!(parser.next(), Some(Err(SmlError::Garbage { skipped: 2 }))));
        assert_eq!(parser.next().unwrap().unwrap(), msg);
    }

    #[test]
    fn damaged_frame_does_not_poison_the_stream() {
        let good = close_message(b"22-2");
        let mut damaged = framing::boxing(&[close_message(b"22-1").encode()]).to_vec();
        // Corrupt a byte inside the message area: both the frame trailer
        // and the embedded message crc16 become invalid
        damaged[12] ^= 0x55;
        damaged.extend_from_slice(&framing::boxing(&[good.encode()]));

        let mut parser = SmlParser::new();
        parser.push(&damaged);

        let mut errors = 0;
        loop {
            match parser.next() {
                Some(Err(_)) => errors += 1,
                Some(Ok(msg)) => {
                    assert_eq!(msg, good);
                    break;
                },
                None => panic!("good frame was lost"),
            }
        }
        assert!(errors >= 1);
    }

    #[test]
    fn reset_clears_pending_state() {
        let mut parser = SmlParser::new();
        parser.push(&[0x76, 0x01]);
        parser.reset();
        parser.push(&framing::boxing(&[close_message(b"33-1").encode()]));
        assert!(parser.next().unwrap().is_ok());
    }
}
