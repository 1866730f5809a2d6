//! Error types for key handling and payload decryption.

use thiserror::Error;

/// Errors raised by key parsing and the mode-5 cipher path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A textual key had the wrong length or invalid hex digits.
    #[error("invalid key text '{text}': expected {expected} hex characters")]
    InvalidKeyText {
        /// Offending input (possibly truncated)
        text: String,
        /// Number of hex characters required
        expected: usize,
    },

    /// The encrypted region of an M-Bus payload is not block aligned.
    #[error("encrypted payload region of {len} bytes is not a multiple of {block} bytes")]
    BlockAlignment {
        /// Length of the region selected for decryption
        len: usize,
        /// Cipher block size
        block: usize,
    },
}
