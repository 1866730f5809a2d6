//! Wireless M-Bus server identities.
//!
//! The canonical 8-byte identity is `manufacturer(2) || address(4) ||
//! version || medium`, all in transmission order. SML frames prefix the
//! identity with the wireless tag byte `0x01`; the text form is
//! `01-e61e-57140621-36-03`.

use std::fmt;
use std::str::FromStr;

use crate::MbusError;

/// SML server-id tag byte for wireless M-Bus identities.
pub const WIRELESS_TAG: u8 = 0x01;

/// 8-byte wireless M-Bus server identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WirelessServerId([u8; 8]);

impl WirelessServerId {
    /// Build from the canonical byte order.
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Assemble from the link-layer fields in transmission order.
    #[must_use]
    pub fn from_link_layer(manufacturer: [u8; 2], address: [u8; 4], version: u8, medium: u8) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..2].copy_from_slice(&manufacturer);
        bytes[2..6].copy_from_slice(&address);
        bytes[6] = version;
        bytes[7] = medium;
        Self(bytes)
    }

    /// Assemble from a long-header secondary address, which transmits
    /// `address(4) || manufacturer(2) || version || medium`.
    #[must_use]
    pub fn from_secondary_address(raw: &[u8; 8]) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..2].copy_from_slice(&raw[4..6]);
        bytes[2..6].copy_from_slice(&raw[..4]);
        bytes[6] = raw[6];
        bytes[7] = raw[7];
        Self(bytes)
    }

    /// Canonical bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Manufacturer code bytes as transmitted.
    #[must_use]
    pub fn manufacturer(&self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }

    /// Meter address bytes as transmitted.
    #[must_use]
    pub fn address(&self) -> [u8; 4] {
        [self.0[2], self.0[3], self.0[4], self.0[5]]
    }

    /// Device version.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.0[6]
    }

    /// Medium code.
    #[must_use]
    pub const fn medium(&self) -> u8 {
        self.0[7]
    }

    /// Three-letter manufacturer id decoded from the flag code.
    #[must_use]
    pub fn manufacturer_flag(&self) -> String {
        let value = u16::from_le_bytes(self.manufacturer());
        let letters = [
            ((value >> 10) & 0x1F) as u8 + 64,
            ((value >> 5) & 0x1F) as u8 + 64,
            (value & 0x1F) as u8 + 64,
        ];
        letters.iter().map(|&b| char::from(b)).collect()
    }

    /// 9-byte SML server id with the wireless tag prefix.
    #[must_use]
    pub fn to_sml_id(&self) -> Vec<u8> {
        let mut id = Vec::with_capacity(9);
        id.push(WIRELESS_TAG);
        id.extend_from_slice(&self.0);
        id
    }

    /// Parse an SML server id carrying the wireless tag.
    #[must_use]
    pub fn from_sml_id(id: &[u8]) -> Option<Self> {
        if id.len() != 9 || id[0] != WIRELESS_TAG {
            return None;
        }
        let bytes: [u8; 8] = id[1..].try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for WirelessServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}-{:02x}-{:02x}",
            WIRELESS_TAG,
            self.0[0],
            self.0[1],
            self.0[2],
            self.0[3],
            self.0[4],
            self.0[5],
            self.0[6],
            self.0[7],
        )
    }
}

impl fmt::Debug for WirelessServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for WirelessServerId {
    type Err = MbusError;

    /// Parse the text form `01-e61e-57140621-36-03`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = MbusError::MalformedRecord { offset: 0, detail: "invalid server id text" };
        let parts: Vec<&str> = s.split('-').collect();
        let [tag, manufacturer, address, version, medium] = parts.as_slice() else {
            return Err(err);
        };
        if u8::from_str_radix(tag, 16).map_err(|_| err.clone())? != WIRELESS_TAG {
            return Err(err);
        }
        let parse_bytes = |text: &str, expected: usize| -> Result<Vec<u8>, MbusError> {
            if text.len() != expected * 2 {
                return Err(err.clone());
            }
            text.as_bytes()
                .chunks_exact(2)
                .map(|pair| {
                    std::str::from_utf8(pair)
                        .ok()
                        .and_then(|p| u8::from_str_radix(p, 16).ok())
                        .ok_or_else(|| err.clone())
                })
                .collect()
        };
        let m = parse_bytes(manufacturer, 2)?;
        let a = parse_bytes(address, 4)?;
        let v = u8::from_str_radix(version, 16).map_err(|_| err.clone())?;
        let t = u8::from_str_radix(medium, 16).map_err(|_| err.clone())?;
        Ok(Self::from_link_layer([m[0], m[1]], [a[0], a[1], a[2], a[3]], v, t))
    }
}

/// Render a numeric meter number as the 4-byte BCD meter id, least
/// significant pair first.
#[must_use]
pub fn meter_id_from_u32(number: u32) -> [u8; 4] {
    let digits = format!("{:08}", number % 100_000_000);
    let mut id = [0u8; 4];
    for (i, pair) in digits.as_bytes().chunks_exact(2).enumerate() {
        let hi = pair[0] - b'0';
        let lo = pair[1] - b'0';
        id[3 - i] = (hi << 4) | lo;
    }
    id
}

/// Parse an 8-digit meter number string into 4 bytes, one byte per
/// decimal digit pair in reading order.
#[must_use]
pub fn meter_id_from_str(text: &str) -> Option<[u8; 4]> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut id = [0u8; 4];
    for (i, pair) in text.as_bytes().chunks_exact(2).enumerate() {
        let value = (pair[0] - b'0') * 10 + (pair[1] - b'0');
        id[i] = value;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_form_matches_the_field_notation() {
        let raw_secondary = [0x57, 0x14, 0x06, 0x21, 0xe6, 0x1e, 0x36, 0x03];
        let id = WirelessServerId::from_secondary_address(&raw_secondary);
        assert_eq!(id.to_string(), "01-e61e-57140621-36-03");
    }

    #[test]
    fn text_form_round_trip() {
        let id: WirelessServerId = "01-e61e-57140621-36-03".parse().unwrap();
        assert_eq!(id.to_string(), "01-e61e-57140621-36-03");
        assert_eq!(id.manufacturer(), [0xe6, 0x1e]);
        assert_eq!(id.address(), [0x57, 0x14, 0x06, 0x21]);
    }

    #[test]
    fn manufacturer_flags() {
        let gwf = WirelessServerId::from_link_layer([0xe6, 0x1e], [0; 4], 0, 0);
        assert_eq!(gwf.manufacturer_flag(), "GWF");
        let emh = WirelessServerId::from_link_layer([0xa8, 0x15], [0; 4], 0, 0);
        assert_eq!(emh.manufacturer_flag(), "EMH");
    }

    #[test]
    fn sml_id_round_trip() {
        let id = WirelessServerId::from_link_layer([0xa8, 0x15], [0x74, 0x31, 0x45, 0x04], 0x01, 0x02);
        let sml = id.to_sml_id();
        assert_eq!(sml, vec![0x01, 0xa8, 0x15, 0x74, 0x31, 0x45, 0x04, 0x01, 0x02]);
        assert_eq!(WirelessServerId::from_sml_id(&sml), Some(id));
    }

    #[test]
    fn meter_id_from_number() {
        // 0x3105c = 200796 renders as 00200796, stored low pair first
        assert_eq!(meter_id_from_u32(0x0003_105C), [0x96, 0x07, 0x20, 0x00]);
    }

    #[test]
    fn meter_id_from_text() {
        assert_eq!(meter_id_from_str("10320047"), Some([0x0A, 0x20, 0x00, 0x2F]));
        assert_eq!(meter_id_from_str("1032004"), None);
    }
}
