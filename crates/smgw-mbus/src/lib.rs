//! Wireless M-Bus support: radio frame parsing, mode-5 payload
//! decryption and the DIF/VIF record reader.
//!
//! The radio path is: link-layer header (length, C field, meter
//! identity), transport layer selected by the CI field (short or long
//! header with access number, status and configuration word), then the
//! payload. Encrypted payloads (security mode 5) decrypt via AES-128-CBC
//! and must start with `2F 2F`; everything else is a wrong key.
//!
//! Decrypted payloads carry either SML (handled by `smgw_proto::sml`) or
//! plain M-Bus data records, which [`reader`] walks DIF/VIF by DIF/VIF.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bcd;
pub mod radio;
pub mod reader;
pub mod server_id;
pub mod time;
pub mod unit;

use thiserror::Error;

pub use radio::{FrameParser, LinkHeader, RadioMode, TransportLayer, decode, restore_data};
pub use reader::{MbusValue, Record, read_record};
pub use server_id::WirelessServerId;
pub use unit::Unit;

/// Errors raised along the wireless M-Bus path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MbusError {
    /// A frame announced less than the minimal link-layer header.
    #[error("radio frame length {0} is below the link-layer header size")]
    FrameTooShort(u8),

    /// The buffer ended inside a header or record.
    #[error("truncated M-Bus data at offset {0}")]
    Truncated(usize),

    /// The decrypted payload did not start with `2F 2F`.
    #[error("payload verification failed: wrong AES key or damaged frame")]
    WrongKey,

    /// The configuration word announces an unsupported security mode.
    #[error("unsupported security mode {0}")]
    UnsupportedMode(u8),

    /// Cipher-level failure.
    #[error(transparent)]
    Cipher(#[from] smgw_crypto::CryptoError),

    /// A record could not be decoded.
    #[error("malformed data record at offset {offset}: {detail}")]
    MalformedRecord {
        /// Offset of the record start
        offset: usize,
        /// What was wrong
        detail: &'static str,
    },
}
