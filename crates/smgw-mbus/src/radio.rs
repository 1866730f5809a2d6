//! Wireless M-Bus radio frames.
//!
//! Link layer: `L | C | M M | A A A A | version | medium | CI | …` with
//! `L` counting every byte after itself. The CI field selects the
//! transport layer: `0x72` long header (secondary address + access
//! number, status, configuration), `0x7A` and `0x7F` short header,
//! `0x78` none. The configuration word carries the security mode in bits
//! 8–12 and the number of encrypted blocks in bits 4–7.

use bytes::{Bytes, BytesMut};
use smgw_crypto::{AesKey, decrypt_mode5, encrypt_mode5};

use crate::server_id::WirelessServerId;
use crate::MbusError;

/// CI: long transport header.
pub const CI_LONG: u8 = 0x72;
/// CI: short transport header.
pub const CI_SHORT: u8 = 0x7A;
/// CI: short transport header, manufacturer variant.
pub const CI_SHORT_MFR: u8 = 0x7F;
/// CI: no transport header.
pub const CI_NONE: u8 = 0x78;

/// Smallest valid link-layer length: C, M, A, version, medium and CI.
const MIN_LENGTH: u8 = 10;

/// Radio protocol mode of a wireless M-Bus adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RadioMode {
    /// Frequent-transmit mode.
    #[default]
    T = 0,
    /// Stationary mode.
    S = 1,
    /// Alternative mode.
    A = 2,
    /// Precision mode.
    P = 3,
}

impl RadioMode {
    /// Lenient wire mapping; unknown values fall back to T mode.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::S,
            2 => Self::A,
            3 => Self::P,
            _ => Self::T,
        }
    }
}

/// Link-layer header of a radio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    /// Announced length (bytes after the length byte).
    pub length: u8,
    /// C field.
    pub c_field: u8,
    /// Meter identity from the link-layer address fields.
    pub id: WirelessServerId,
    /// CI field selecting the transport layer.
    pub ci: u8,
}

/// Transport layer of a radio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    /// CI without a transport header.
    None,
    /// Short header: the link-layer identity applies.
    Short {
        /// Access number.
        access_no: u8,
        /// Meter status.
        status: u8,
        /// Configuration word.
        config: u16,
    },
    /// Long header carrying a secondary address.
    Long {
        /// Secondary identity, canonicalised.
        secondary: WirelessServerId,
        /// Access number.
        access_no: u8,
        /// Meter status.
        status: u8,
        /// Configuration word.
        config: u16,
    },
}

impl TransportLayer {
    /// Access number, 0 without a transport header.
    #[must_use]
    pub fn access_no(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Short { access_no, .. } | Self::Long { access_no, .. } => *access_no,
        }
    }

    /// Configuration word, 0 without a transport header.
    #[must_use]
    pub fn config(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::Short { config, .. } | Self::Long { config, .. } => *config,
        }
    }

    /// Security mode from the configuration word.
    #[must_use]
    pub fn security_mode(&self) -> u8 {
        ((self.config() >> 8) & 0x1F) as u8
    }

    /// Number of encrypted 16-byte blocks from the configuration word.
    #[must_use]
    pub fn encrypted_blocks(&self) -> usize {
        usize::from((self.config() >> 4) & 0x0F)
    }

    /// Secondary address, if the frame carries a long header.
    #[must_use]
    pub fn secondary_address(&self) -> Option<WirelessServerId> {
        match self {
            Self::Long { secondary, .. } => Some(*secondary),
            _ => None,
        }
    }
}

/// Effective server identity: the secondary address wins over the
/// link-layer identity.
#[must_use]
pub fn effective_id(header: &LinkHeader, tpl: &TransportLayer) -> WirelessServerId {
    tpl.secondary_address().unwrap_or(header.id)
}

/// Streaming radio frame parser.
///
/// Radio frames arrive back to back on the adapter's byte stream; the
/// leading length byte drives reassembly. A header violation drops a
/// single byte and retries, which realigns after at most one frame.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
}

impl FrameParser {
    /// Fresh parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append adapter bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

impl Iterator for FrameParser {
    type Item = Result<(LinkHeader, TransportLayer, Bytes), MbusError>;

    /// Next complete frame.
    ///
    /// `None` means the buffered data is exhausted; pushing more bytes
    /// can yield further frames.
    fn next(&mut self) -> Option<Self::Item> {
        let length = *self.buf.first()?;
        if length < MIN_LENGTH {
            let _ = self.buf.split_to(1);
            return Some(Err(MbusError::FrameTooShort(length)));
        }
        let total = usize::from(length) + 1;
        if self.buf.len() < total {
            return None;
        }
        let frame = self.buf.split_to(total).freeze();
        match parse_frame(&frame) {
            Ok(parsed) => Some(Ok(parsed)),
            Err(err) => {
                tracing::debug!("dropped undecodable radio frame: {err}");
                Some(Err(err))
            },
        }
    }
}

/// Parse one complete frame (`frame[0]` is the length byte).
fn parse_frame(frame: &[u8]) -> Result<(LinkHeader, TransportLayer, Bytes), MbusError> {
    if frame.len() < usize::from(MIN_LENGTH) + 1 {
        return Err(MbusError::Truncated(frame.len()));
    }
    let header = LinkHeader {
        length: frame[0],
        c_field: frame[1],
        id: WirelessServerId::from_link_layer(
            [frame[2], frame[3]],
            [frame[4], frame[5], frame[6], frame[7]],
            frame[8],
            frame[9],
        ),
        ci: frame[10],
    };

    let mut pos = 11usize;
    let need = |pos: usize, n: usize| -> Result<(), MbusError> {
        if frame.len() < pos + n { Err(MbusError::Truncated(pos)) } else { Ok(()) }
    };

    let tpl = match header.ci {
        CI_LONG => {
            need(pos, 12)?;
            let raw: [u8; 8] = frame[pos..pos + 8]
                .try_into()
                .map_err(|_| MbusError::Truncated(pos))?;
            let secondary = WirelessServerId::from_secondary_address(&raw);
            let access_no = frame[pos + 8];
            let status = frame[pos + 9];
            let config = u16::from_le_bytes([frame[pos + 10], frame[pos + 11]]);
            pos += 12;
            TransportLayer::Long { secondary, access_no, status, config }
        },
        CI_SHORT | CI_SHORT_MFR => {
            need(pos, 4)?;
            let access_no = frame[pos];
            let status = frame[pos + 1];
            let config = u16::from_le_bytes([frame[pos + 2], frame[pos + 3]]);
            pos += 4;
            TransportLayer::Short { access_no, status, config }
        },
        _ => TransportLayer::None,
    };

    Ok((header, tpl, Bytes::copy_from_slice(&frame[pos..])))
}

/// Decrypt a frame payload according to its security mode.
///
/// Mode 0 passes through; mode 5 decrypts with AES-128-CBC and requires
/// the `2F 2F` verification prefix. The returned buffer keeps the
/// trailing `2F` fill bytes — both the SML parser and the record reader
/// skip them.
pub fn decode(
    header: &LinkHeader,
    tpl: &TransportLayer,
    key: &AesKey,
    payload: &[u8],
) -> Result<Vec<u8>, MbusError> {
    match tpl.security_mode() {
        0 => Ok(payload.to_vec()),
        5 => {
            let id = effective_id(header, tpl);
            let clear = decrypt_mode5(
                id.as_bytes(),
                tpl.access_no(),
                key,
                tpl.encrypted_blocks(),
                payload,
            )?;
            if clear.len() < 2 || clear[0] != 0x2F || clear[1] != 0x2F {
                return Err(MbusError::WrongKey);
            }
            Ok(clear)
        },
        mode => Err(MbusError::UnsupportedMode(mode)),
    }
}

/// Re-encrypt a clear payload and rebuild the original frame bytes.
pub fn restore_data(
    header: &LinkHeader,
    tpl: &TransportLayer,
    key: &AesKey,
    clear: &[u8],
) -> Result<Vec<u8>, MbusError> {
    let payload = match tpl.security_mode() {
        0 => clear.to_vec(),
        5 => {
            let id = effective_id(header, tpl);
            encrypt_mode5(id.as_bytes(), tpl.access_no(), key, tpl.encrypted_blocks(), clear)?
        },
        mode => return Err(MbusError::UnsupportedMode(mode)),
    };

    let mut out = Vec::with_capacity(usize::from(header.length) + 1);
    out.push(header.length);
    out.push(header.c_field);
    out.extend_from_slice(&header.id.manufacturer());
    out.extend_from_slice(&header.id.address());
    out.push(header.id.version());
    out.push(header.id.medium());
    out.push(header.ci);
    match tpl {
        TransportLayer::None => {},
        TransportLayer::Short { access_no, status, config } => {
            out.push(*access_no);
            out.push(*status);
            out.extend_from_slice(&config.to_le_bytes());
        },
        TransportLayer::Long { secondary, access_no, status, config } => {
            out.extend_from_slice(&secondary.address());
            out.extend_from_slice(&secondary.manufacturer());
            out.push(secondary.version());
            out.push(secondary.medium());
            out.push(*access_no);
            out.push(*status);
            out.extend_from_slice(&config.to_le_bytes());
        },
    }
    out.extend_from_slice(&payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use smgw_proto::sml::{SmlBody, SmlParser, SmlValue};
    use smgw_proto::obis::codes;

    use super::*;

    fn aes_key(text: &str) -> AesKey {
        let bytes = hex::decode(text).unwrap();
        bytes.as_slice().try_into().unwrap()
    }

    /// Captured EMH electricity meter frame, security mode 5.
    fn emh_frame() -> Vec<u8> {
        hex::decode(concat!(
            "ce44a8157431450401027f4600c005",
            "5735f107c8b4a76721179097fabfcd2292eec515c57b738ae3297f529cb1ead9",
            "a41cedc9ab75734f8a3b4b428be89d40029531b30b3251bf7d4cc0da3779771b",
            "59a0ac3c268128919575c35368893ae3e767fe6ccd15f8023e285b438e1aca5d",
            "bf0fb171635e00959539d544939622",
            "44a1c49ea0c65e98c88f1ca7cc19956c88c2dd66879aa86a27865a1154dc9b7c",
            "d58fb017fc11aa6ea06ec78042b4b0437b58291530b1cc357a97b46e7e410210",
            "b150c464803d6bd6bec0b1451f90ccc2cf",
        ))
        .unwrap()
    }

    #[test]
    fn short_header_parse_and_decrypt() {
        let frame = emh_frame();
        let mut parser = FrameParser::new();
        parser.push(&frame);

        let (header, tpl, payload) = parser.next().unwrap().unwrap();
        assert_eq!(header.id.manufacturer(), [0xA8, 0x15]);
        assert_eq!(header.id.manufacturer_flag(), "EMH");
        assert_eq!(tpl.security_mode(), 5);
        assert_eq!(tpl.encrypted_blocks(), 12);

        let key = aes_key("23A84B07EBCBAF948895DF0E9133520D");
        let clear = decode(&header, &tpl, &key, &payload).unwrap();
        assert_eq!(clear.len(), 0xC0);
        assert_eq!(&clear[..2], &[0x2F, 0x2F]);

        // The clear payload is an SML GetList.Res
        let mut sml = SmlParser::new();
        sml.push(&clear);
        let msg = sml.next().unwrap().unwrap();
        let SmlBody::GetListResponse(res) = msg.body else {
            panic!("expected GetList.Res");
        };
        let energy = res
            .entries
            .iter()
            .find(|e| e.name == codes::REG_ENERGY_TOTAL)
            .unwrap();
        assert_eq!(energy.scaler, Some(-1));
        assert_eq!(energy.unit, Some(30));
        assert_eq!(energy.value, SmlValue::I64(0x38B9));

        // Round trip back to the original wire bytes
        let restored = restore_data(&header, &tpl, &key, &clear).unwrap();
        assert_eq!(restored, frame);
    }

    #[test]
    fn long_header_secondary_address() {
        let frame = [
            0x36, 0x44, 0xe6, 0x1e, 0x79, 0x42, 0x68, 0x00, 0x02, 0x0e, 0x72, 0x57, 0x14, 0x06,
            0x21, 0xe6, 0x1e, 0x36, 0x03, 0xf3, 0x00, 0x20, 0x65, 0xd4, 0xfc, 0xa9, 0xb9, 0x37,
            0x81, 0x3f, 0xf1, 0x45, 0xf0, 0x4c, 0x61, 0x1e, 0x65, 0x13, 0x43, 0x69, 0x60, 0x69,
            0x43, 0x08, 0x86, 0x1c, 0xbc, 0x98, 0x2d, 0xb5, 0x4a, 0xbb, 0x76, 0xb3, 0xa3,
        ];
        let mut parser = FrameParser::new();
        parser.push(&frame);

        let (header, tpl, payload) = parser.next().unwrap().unwrap();
        let secondary = tpl.secondary_address().unwrap();
        assert_eq!(secondary.to_string(), "01-e61e-57140621-36-03");
        assert_eq!(effective_id(&header, &tpl), secondary);

        let key = aes_key("6140B8C066EDDE3773EDF7F8007A45AB");
        let clear = decode(&header, &tpl, &key, &payload).unwrap();
        assert_eq!(clear.len(), 0x20);
        assert_eq!(&clear[..2], &[0x2F, 0x2F]);

        let restored = restore_data(&header, &tpl, &key, &clear).unwrap();
        assert_eq!(restored, frame);
    }

    #[test]
    fn wrong_key_is_detected() {
        let frame = emh_frame();
        let mut parser = FrameParser::new();
        parser.push(&frame);
        let (header, tpl, payload) = parser.next().unwrap().unwrap();

        let key = aes_key("00000000000000000000000000000000");
        assert_eq!(decode(&header, &tpl, &key, &payload), Err(MbusError::WrongKey));
    }

    #[test]
    fn frames_split_across_pushes() {
        let frame = emh_frame();
        let mut parser = FrameParser::new();
        for chunk in frame.chunks(7) {
            parser.push(chunk);
        }
        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().is_none());
    }

    #[test]
    fn short_length_byte_is_skipped() {
        let mut parser = FrameParser::new();
        parser.push(&[0x03]);
        assert!(matches!(parser.next(), Some(Err(MbusError::FrameTooShort(3)))));
    }
}
