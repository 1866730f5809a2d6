//! OBIS identifiers and paths.
//!
//! An OBIS code names a metrological or administrative datum with six
//! value groups `(A, B, C, D, E, F)`: medium, channel, indicator, mode,
//! quantity and storage. Equality is bytewise. The canonical text form is
//! `A-B:C.D.E*F` in decimal; the compact form is twelve hex characters.

mod registry;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use registry::{codes, name};

/// Errors produced when parsing OBIS text forms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObisError {
    /// The hex form did not contain exactly twelve hex characters.
    #[error("invalid OBIS hex form '{0}'")]
    InvalidHex(String),

    /// The decimal form did not match `A-B:C.D.E*F`.
    #[error("invalid OBIS text form '{0}'")]
    InvalidText(String),

    /// An OBIS path needs at least one code.
    #[error("empty OBIS path")]
    EmptyPath,
}

/// Fixed-width 6-byte OBIS identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Obis([u8; 6]);

impl Obis {
    /// Construct from the six value groups.
    #[must_use]
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self([a, b, c, d, e, f])
    }

    /// Construct from a raw 6-byte array.
    #[must_use]
    pub const fn from_array(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Construct from a byte slice, if it has exactly six bytes.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Value group A — medium.
    #[must_use]
    pub const fn medium(&self) -> u8 {
        self.0[0]
    }

    /// Value group B — channel.
    #[must_use]
    pub const fn channel(&self) -> u8 {
        self.0[1]
    }

    /// Value group C — indicator.
    #[must_use]
    pub const fn indicator(&self) -> u8 {
        self.0[2]
    }

    /// Value group D — measurement mode.
    #[must_use]
    pub const fn mode(&self) -> u8 {
        self.0[3]
    }

    /// Value group E — quantity / tariff.
    #[must_use]
    pub const fn quantity(&self) -> u8 {
        self.0[4]
    }

    /// Value group F — storage / billing period.
    #[must_use]
    pub const fn storage(&self) -> u8 {
        self.0[5]
    }

    /// Whether the code names an abstract (non-metrological) datum.
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.0[0] == 0x81 || self.0[0] == 0x00
    }

    /// Whether the code names a physical quantity on a known medium
    /// (electricity, heat, gas, water and related media).
    #[must_use]
    pub fn is_physical_unit(&self) -> bool {
        (1..=9).contains(&self.0[0])
    }

    /// Whether value group C lies in the manufacturer-private range.
    #[must_use]
    pub fn is_private(&self) -> bool {
        (128..=199).contains(&self.0[2]) || self.0[2] == 0xF0
    }

    /// Compact hex form: twelve lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(12);
        for byte in self.0 {
            let _ = fmt::Write::write_fmt(&mut out, format_args!("{byte:02x}"));
        }
        out
    }

    /// Parse the compact hex form produced by [`Obis::to_hex`].
    pub fn from_hex(text: &str) -> Result<Self, ObisError> {
        if text.len() != 12 || !text.is_ascii() {
            return Err(ObisError::InvalidHex(text.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (i, chunk) in text.as_bytes().chunks_exact(2).enumerate() {
            let digits = std::str::from_utf8(chunk).map_err(|_| ObisError::InvalidHex(text.to_string()))?;
            bytes[i] = u8::from_str_radix(digits, 16).map_err(|_| ObisError::InvalidHex(text.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Well-known name from the registry, if any.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        registry::name(*self)
    }
}

impl fmt::Display for Obis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}.{}.{}*{}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Obis {
    // Codes read better in their text form
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Obis {
    type Err = ObisError;

    /// Parse the canonical `A-B:C.D.E*F` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ObisError::InvalidText(s.to_string());

        let (a, rest) = s.split_once('-').ok_or_else(err)?;
        let (b, rest) = rest.split_once(':').ok_or_else(err)?;
        let (c, rest) = rest.split_once('.').ok_or_else(err)?;
        let (d, rest) = rest.split_once('.').ok_or_else(err)?;
        let (e, f) = rest.split_once('*').ok_or_else(err)?;

        Ok(Self([
            a.parse().map_err(|_| err())?,
            b.parse().map_err(|_| err())?,
            c.parse().map_err(|_| err())?,
            d.parse().map_err(|_| err())?,
            e.parse().map_err(|_| err())?,
            f.parse().map_err(|_| err())?,
        ]))
    }
}

/// Ordered, non-empty sequence of OBIS codes addressing a parameter tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObisPath(Vec<Obis>);

impl ObisPath {
    /// Build a path from codes; at least one code is required.
    pub fn new(codes: Vec<Obis>) -> Result<Self, ObisError> {
        if codes.is_empty() {
            return Err(ObisError::EmptyPath);
        }
        Ok(Self(codes))
    }

    /// Single-code path.
    #[must_use]
    pub fn root(code: Obis) -> Self {
        Self(vec![code])
    }

    /// First code of the path.
    #[must_use]
    pub fn head(&self) -> Obis {
        self.0[0]
    }

    /// All codes in order.
    #[must_use]
    pub fn codes(&self) -> &[Obis] {
        &self.0
    }

    /// Number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A path is never empty; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Extend the path by one code.
    #[must_use]
    pub fn join(&self, code: Obis) -> Self {
        let mut codes = self.0.clone();
        codes.push(code);
        Self(codes)
    }
}

impl fmt::Display for ObisPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, code) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{code}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn hex_form() {
        let code = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x01, 0xFF);
        assert_eq!(code.to_hex(), "8181c78201ff");
        assert_eq!(Obis::from_hex("8181c78201ff").unwrap(), code);
    }

    #[test]
    fn text_form() {
        let code = Obis::new(1, 0, 1, 8, 0, 255);
        assert_eq!(code.to_string(), "1-0:1.8.0*255");
        assert_eq!("1-0:1.8.0*255".parse::<Obis>().unwrap(), code);
    }

    #[test]
    fn classification() {
        assert!(codes::ROOT_DEVICE_IDENT.is_abstract());
        assert!(Obis::new(1, 0, 1, 8, 0, 255).is_physical_unit());
        assert!(Obis::new(1, 0, 0x80, 8, 0, 255).is_private());
        assert!(!Obis::new(1, 0, 1, 8, 0, 255).is_private());
    }

    #[test]
    fn single_code_path_is_accepted() {
        let path = ObisPath::new(vec![codes::ROOT_IPT_PARAM]).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.head(), codes::ROOT_IPT_PARAM);
    }

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(ObisPath::new(vec![]).unwrap_err(), ObisError::EmptyPath);
    }

    #[test]
    fn registry_knows_op_log() {
        assert_eq!(codes::CLASS_OP_LOG.name(), Some("CLASS_OP_LOG"));
    }

    proptest! {
        #[test]
        fn hex_round_trip(bytes in any::<[u8; 6]>()) {
            let code = Obis::from_array(bytes);
            prop_assert_eq!(Obis::from_hex(&code.to_hex()).unwrap(), code);
        }

        #[test]
        fn text_round_trip(bytes in any::<[u8; 6]>()) {
            let code = Obis::from_array(bytes);
            prop_assert_eq!(code.to_string().parse::<Obis>().unwrap(), code);
        }
    }
}
