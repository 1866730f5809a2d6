//! IP-T stream scrambling.
//!
//! The IP-T byte stream is obfuscated against a 32-byte key. Per
//! processed byte, three things happen: the byte is XORed with the key
//! byte under the cursor, the key rotates forward by the plaintext byte
//! value, and the cursor advances by one. The rotation makes the key
//! schedule data dependent; both ends stay in lockstep because the
//! rotation amount is the plaintext value — the encoder's input and the
//! decoder's output. Each transfer direction keeps its own state, so a
//! session owns two independent [`Scrambler`]s. The default key is all
//! zero until a scrambled login installs a fresh one.
//!
//! Scrambling never fails — a mismatched key merely produces bytes that
//! fail CRC checks further up the stack.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;

use crate::error::CryptoError;

/// Length of an IP-T scramble key in bytes.
pub const SCRAMBLE_KEY_SIZE: usize = 32;

/// 32-byte symmetric permutation key for the IP-T byte stream.
///
/// `Default` is the all-zero [`ScrambleKey::NULL`] key.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrambleKey([u8; SCRAMBLE_KEY_SIZE]);

impl ScrambleKey {
    /// The all-zero key every session starts with.
    pub const NULL: Self = Self([0u8; SCRAMBLE_KEY_SIZE]);

    /// Wrap raw key bytes.
    #[must_use]
    pub const fn new(bytes: [u8; SCRAMBLE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key for a scrambled login.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; SCRAMBLE_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SCRAMBLE_KEY_SIZE] {
        &self.0
    }

    /// Whether this is the all-zero default key.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for ScrambleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ScrambleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys appear in logs as text; keep the full value visible, the
        // scrambler is obfuscation rather than secrecy.
        write!(f, "ScrambleKey({})", hex::encode(self.0))
    }
}

impl FromStr for ScrambleKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|_| CryptoError::InvalidKeyText {
            text: s.chars().take(80).collect(),
            expected: SCRAMBLE_KEY_SIZE * 2,
        })?;
        let bytes: [u8; SCRAMBLE_KEY_SIZE] =
            decoded.try_into().map_err(|_| CryptoError::InvalidKeyText {
                text: s.chars().take(80).collect(),
                expected: SCRAMBLE_KEY_SIZE * 2,
            })?;
        Ok(Self(bytes))
    }
}

/// One direction of the scrambled stream.
///
/// The state is the cursor into the key plus the accumulated key
/// rotation. The rotation is tracked as an offset instead of moving the
/// key bytes; the effective key byte is `key[(cursor + rotation) % 32]`.
///
/// Scrambling and unscrambling are mirror operations, not the same one:
/// the key rotates by the plaintext byte, which is the input when
/// scrambling and the output when unscrambling.
#[derive(Debug, Clone)]
pub struct Scrambler {
    key: ScrambleKey,
    index: usize,
    rotation: usize,
}

impl Scrambler {
    /// Start a direction with the given key, cursor and rotation at 0.
    #[must_use]
    pub fn new(key: ScrambleKey) -> Self {
        Self { key, index: 0, rotation: 0 }
    }

    /// Replace the key and reset the direction state.
    ///
    /// Called when a scrambled login installs a new key; both peers reset
    /// their direction state at the handshake boundary.
    pub fn set_key(&mut self, key: ScrambleKey) {
        self.key = key;
        self.index = 0;
        self.rotation = 0;
    }

    /// Current key.
    #[must_use]
    pub fn key(&self) -> ScrambleKey {
        self.key
    }

    /// Key byte under the cursor with the rotation applied.
    fn current(&self) -> u8 {
        self.key.0[(self.index + self.rotation) % SCRAMBLE_KEY_SIZE]
    }

    /// Rotate the key by the plaintext value, advance the cursor by one.
    fn advance(&mut self, plain: u8) {
        self.rotation = (self.rotation + usize::from(plain)) % SCRAMBLE_KEY_SIZE;
        self.index = (self.index + 1) % SCRAMBLE_KEY_SIZE;
    }

    /// Scramble plaintext in place, advancing the direction state.
    pub fn scramble(&mut self, data: &mut [u8]) {
        for byte in data {
            let plain = *byte;
            *byte ^= self.current();
            self.advance(plain);
        }
    }

    /// Unscramble stream bytes in place, advancing the direction state.
    ///
    /// Mirror of [`Scrambler::scramble`]: the rotation amount is the
    /// plaintext, which on this side is the output of the XOR.
    pub fn unscramble(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.current();
            self.advance(*byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn null_key_is_identity() {
        let mut tx = Scrambler::new(ScrambleKey::NULL);
        let mut data = vec![0x10, 0x20, 0x30];
        tx.scramble(&mut data);
        assert_eq!(data, vec![0x10, 0x20, 0x30]);

        let mut rx = Scrambler::new(ScrambleKey::NULL);
        rx.unscramble(&mut data);
        assert_eq!(data, vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn rotation_depends_on_the_data() {
        // key[i] = i makes the rotation visible: the first plaintext
        // byte shifts the key under the second one
        let key = ScrambleKey::new(std::array::from_fn(|i| i as u8));

        let mut tx = Scrambler::new(key);
        let mut first = [3u8, 0];
        tx.scramble(&mut first);
        // byte 0: 3 ^ key[0]; byte 1: key rotated by 3, cursor at 1
        assert_eq!(first, [3, 4]);

        let mut tx = Scrambler::new(key);
        let mut second = [0u8, 0];
        tx.scramble(&mut second);
        assert_eq!(second, [0, 1]);
    }

    #[test]
    fn key_text_round_trip() {
        let key = ScrambleKey::random();
        let parsed: ScrambleKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn rejects_short_key_text() {
        let err = "0102".parse::<ScrambleKey>().unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyText { expected: 64, .. }));
    }

    #[test]
    fn set_key_resets_the_direction_state() {
        let key = ScrambleKey::new(std::array::from_fn(|i| i as u8));
        let mut tx = Scrambler::new(key);
        let mut probe = [0x11u8; 5];
        tx.scramble(&mut probe);

        tx.set_key(key);
        let mut plain = [0x55u8, 0x55];
        tx.scramble(&mut plain);
        // Cursor and rotation restarted at 0: key[0], then key rotated
        // by 0x55 under cursor 1
        assert_eq!(plain, [0x55, 0x55 ^ key.as_bytes()[(1 + 0x55) % 32]]);
    }

    proptest! {
        #[test]
        fn scramble_unscramble_round_trip(key in any::<[u8; SCRAMBLE_KEY_SIZE]>(), data in any::<Vec<u8>>()) {
            let key = ScrambleKey::new(key);
            let mut tx = Scrambler::new(key);
            let mut rx = Scrambler::new(key);

            let mut wire = data.clone();
            tx.scramble(&mut wire);
            rx.unscramble(&mut wire);
            prop_assert_eq!(wire, data);
        }

        #[test]
        fn directions_are_independent(key in any::<[u8; SCRAMBLE_KEY_SIZE]>(),
                                      first in any::<Vec<u8>>(),
                                      second in any::<Vec<u8>>()) {
            // Send traffic on one direction must not disturb the other.
            let key = ScrambleKey::new(key);
            let mut tx = Scrambler::new(key);
            let mut rx = Scrambler::new(key);

            let mut outbound = first.clone();
            tx.scramble(&mut outbound);

            // The receive direction still decodes a fresh peer stream
            let mut peer = Scrambler::new(key);
            let mut inbound = second.clone();
            peer.scramble(&mut inbound);
            rx.unscramble(&mut inbound);
            prop_assert_eq!(inbound, second);
        }
    }
}
