//! Smart Message Language (SML) binary codec.
//!
//! SML is a TLV protocol: every element carries a tag byte whose high
//! nibble selects the type family and whose low nibble is a length. For
//! scalars the length counts the tag byte(s) plus the content; for lists
//! it is the element count. A length continuation bit allows longer
//! elements. The special bytes `0x01` ("not set") and `0x00` (end of
//! message) complete the alphabet.
//!
//! Messages travel inside an escape framing: `1B1B1B1B 01010101` opens a
//! transmission, `1B1B1B1B 1A pp c1c2` closes it with a pad count and a
//! CRC-16 trailer.
//!
//! The module splits into the value layer ([`value`]), the tree model
//! ([`tree`]), the message model ([`message`]), the escape framing
//! ([`framing`]), the stateful request generator ([`generator`]) and the
//! resettable stream parser ([`parser`]).

pub mod framing;
pub mod generator;
pub mod message;
pub mod parser;
pub mod tree;
pub mod value;

use thiserror::Error;

pub use generator::RequestGenerator;
pub use message::{
    AttentionResponse, CloseRequest, CloseResponse, GetListRequest, GetListResponse,
    GetProcParameterRequest, GetProcParameterResponse, GetProfileListRequest,
    GetProfileListResponse, ListEntry, OpenRequest, OpenResponse, PeriodEntry,
    SetProcParameterRequest, SetProcParameterResponse, SmlBody, SmlMessage,
};
pub use parser::SmlParser;
pub use tree::SmlTree;
pub use value::{Decoder, Encoder, SmlValue};

/// Maximum nesting depth accepted when decoding parameter trees.
pub const MAX_TREE_DEPTH: usize = 16;

/// Errors raised by the SML codec.
///
/// Parse-level errors are recoverable: the stream parser reports them and
/// resynchronises at the next escape sequence instead of poisoning the
/// session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmlError {
    /// The buffer ended inside an element.
    #[error("truncated SML data at offset {0}")]
    Truncated(usize),

    /// A tag byte did not describe a decodable element.
    #[error("invalid TL field {tl:#04x} at offset {pos}")]
    InvalidTl {
        /// Offending tag byte
        tl: u8,
        /// Offset in the current buffer
        pos: usize,
    },

    /// An element of a different type family was found.
    #[error("expected SML type {expected} at offset {pos}, found type {found}")]
    UnexpectedType {
        /// Expected type family (0, 4, 5, 6 or 7)
        expected: u8,
        /// Type family found on the wire
        found: u8,
        /// Offset in the current buffer
        pos: usize,
    },

    /// A scalar content length exceeds what the target type can hold.
    #[error("scalar of {len} bytes does not fit the requested width at offset {pos}")]
    ScalarWidth {
        /// Content length found on the wire
        len: usize,
        /// Offset in the current buffer
        pos: usize,
    },

    /// Message CRC mismatch.
    #[error("SML message crc16 mismatch: calculated {calculated:#06x}, message carries {carried:#06x}")]
    Crc {
        /// Checksum computed over the received bytes
        calculated: u16,
        /// Checksum carried in the message
        carried: u16,
    },

    /// The message body choice is not a known message kind.
    #[error("unknown SML body choice {choice:#06x}")]
    UnknownBody {
        /// Choice value found on the wire
        choice: u32,
    },

    /// A parameter tree was deeper than [`MAX_TREE_DEPTH`].
    #[error("parameter tree exceeds maximum depth of {MAX_TREE_DEPTH}")]
    DepthExceeded,

    /// Structural error inside a known message kind.
    #[error("malformed SML message: {0}")]
    Malformed(&'static str),

    /// Escape framing was damaged.
    #[error("damaged SML escape framing: {0}")]
    Framing(&'static str),

    /// Bytes before the next escape sequence could not be interpreted.
    #[error("skipped {skipped} undecodable bytes")]
    Garbage {
        /// Number of bytes dropped while resynchronising
        skipped: usize,
    },
}
