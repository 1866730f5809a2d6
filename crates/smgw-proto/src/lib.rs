//! Wire protocols of the smart meter gateway stack.
//!
//! Three protocol families live here:
//!
//! - [`obis`] — the 6-byte OBIS identifier, paths and the registry of
//!   well-known codes
//! - [`sml`] — the Smart Message Language TLV codec: values, trees,
//!   messages, escape framing, a request generator and a resettable
//!   stream parser
//! - [`ipt`] — the IP-T tunnelling protocol: frame codec, command and
//!   response-code enums, payload builders and the scrambled
//!   serializer/parser pair
//!
//! All codecs are pure: they transform bytes and never perform I/O. The
//! session and proxy layers in `smgw-core` drive them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod ipt;
pub mod obis;
pub mod sml;

pub use obis::{Obis, ObisPath};
