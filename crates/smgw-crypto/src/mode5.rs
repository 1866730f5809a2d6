//! AES-128-CBC payload handling for wireless M-Bus security mode 5.
//!
//! The initialisation vector binds the cipher stream to the sending meter:
//! manufacturer code (2 bytes, as transmitted), address (4 bytes, as
//! transmitted), version, medium, then the transport-layer access number
//! repeated eight times. Only whole 16-byte blocks are ciphered; a meter
//! pads the clear text with `0x2F` fill bytes, and a trailing partial
//! region stays unencrypted on the wire.
//!
//! Whether the key was right is decided by the caller: correct plaintext
//! starts `2F 2F`.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Block};

use crate::error::CryptoError;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// An AES-128 key for M-Bus mode-5 payloads.
pub type AesKey = [u8; 16];

type CbcDec = cbc::Decryptor<Aes128>;
type CbcEnc = cbc::Encryptor<Aes128>;

/// Build the mode-5 IV from the meter identity and access number.
///
/// `id` is the 8-byte wireless server id in transmission order:
/// manufacturer (2), address (4), version, medium.
#[must_use]
pub fn mode5_iv(id: &[u8; 8], access_no: u8) -> [u8; 16] {
    let mut iv = [access_no; 16];
    iv[..8].copy_from_slice(id);
    iv
}

/// Decrypt the first `blocks × 16` bytes of `payload` in place of a copy.
///
/// Bytes beyond the encrypted region are passed through unchanged. The
/// caller verifies the `2F 2F` prefix afterwards.
///
/// # Errors
///
/// - [`CryptoError::BlockAlignment`] if `blocks × 16` exceeds the payload
pub fn decrypt_mode5(
    id: &[u8; 8],
    access_no: u8,
    key: &AesKey,
    blocks: usize,
    payload: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let enc_len = blocks * AES_BLOCK_SIZE;
    if enc_len > payload.len() {
        return Err(CryptoError::BlockAlignment { len: payload.len(), block: enc_len });
    }

    let mut out = payload.to_vec();
    let mut cipher = CbcDec::new(key.into(), &mode5_iv(id, access_no).into());
    for chunk in out[..enc_len].chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.decrypt_block_mut(Block::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Re-encrypt a clear payload, the inverse of [`decrypt_mode5`].
///
/// Used to restore captured frames to their original wire bytes.
///
/// # Errors
///
/// - [`CryptoError::BlockAlignment`] if `blocks × 16` exceeds the payload
pub fn encrypt_mode5(
    id: &[u8; 8],
    access_no: u8,
    key: &AesKey,
    blocks: usize,
    payload: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let enc_len = blocks * AES_BLOCK_SIZE;
    if enc_len > payload.len() {
        return Err(CryptoError::BlockAlignment { len: payload.len(), block: enc_len });
    }

    let mut out = payload.to_vec();
    let mut cipher = CbcEnc::new(key.into(), &mode5_iv(id, access_no).into());
    for chunk in out[..enc_len].chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_block_mut(Block::from_mut_slice(chunk));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn iv_layout() {
        let id = [0xA8, 0x15, 0x74, 0x31, 0x45, 0x04, 0x01, 0x02];
        let iv = mode5_iv(&id, 0x46);
        assert_eq!(&iv[..8], &id);
        assert_eq!(&iv[8..], &[0x46; 8]);
    }

    #[test]
    fn rejects_oversized_block_count() {
        let id = [0u8; 8];
        let key = [0u8; 16];
        let err = decrypt_mode5(&id, 0, &key, 2, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::BlockAlignment { .. }));
    }

    #[test]
    fn partial_tail_is_untouched() {
        let id = [1, 2, 3, 4, 5, 6, 7, 8];
        let key = [0x42; 16];
        let mut payload = vec![0u8; 16];
        payload.extend_from_slice(&[0xDE, 0xAD, 0xBE]);

        let out = decrypt_mode5(&id, 9, &key, 1, &payload).unwrap();
        assert_eq!(&out[16..], &[0xDE, 0xAD, 0xBE]);
    }

    proptest! {
        #[test]
        fn encrypt_decrypt_round_trip(
            id in any::<[u8; 8]>(),
            access_no in any::<u8>(),
            key in any::<AesKey>(),
            blocks in 0usize..4,
            tail in any::<Vec<u8>>(),
        ) {
            let mut clear = vec![0x2F; blocks * AES_BLOCK_SIZE];
            clear.extend_from_slice(&tail);

            let wire = encrypt_mode5(&id, access_no, &key, blocks, &clear).unwrap();
            let back = decrypt_mode5(&id, access_no, &key, blocks, &wire).unwrap();
            prop_assert_eq!(back, clear);
        }
    }
}
