//! SML value layer: the tagged scalar variant and the TLV encoder/decoder.
//!
//! Wire rules (type nibble / length nibble):
//!
//! - type 0 octet string, 4 bool, 5 signed, 6 unsigned, 7 list
//! - for scalars the length counts tag byte(s) plus content; for lists it
//!   is the element count
//! - bit 7 of a tag byte continues the length in the following byte,
//!   4 bits at a time; continuation bytes carry no type bits
//! - `0x01` is the optional marker ("not set"), `0x00` ends a message
//!
//! Integers are big-endian. The decoder accepts any content width from 1
//! to 8 bytes and maps it to the narrowest matching variant; the encoder
//! always writes the full canonical width of the variant, so
//! `decode(encode(v)) == v` holds for every [`SmlValue`].

use bytes::{BufMut, Bytes, BytesMut};

use super::SmlError;

/// Octet string type family.
pub const TYPE_OCTET: u8 = 0;
/// Boolean type family.
pub const TYPE_BOOL: u8 = 4;
/// Signed integer type family.
pub const TYPE_INT: u8 = 5;
/// Unsigned integer type family.
pub const TYPE_UINT: u8 = 6;
/// List type family.
pub const TYPE_LIST: u8 = 7;

/// The "not set" marker byte.
pub const NOT_SET: u8 = 0x01;
/// The end-of-message marker byte.
pub const END_OF_MESSAGE: u8 = 0x00;

/// SML_Time choice tag for a seconds index.
const TIME_SEC_INDEX: u8 = 1;
/// SML_Time choice tag for an absolute timestamp.
const TIME_TIMESTAMP: u8 = 2;

/// Tagged scalar variant carried by SML elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmlValue {
    /// Explicit "not set".
    None,
    /// Boolean.
    Bool(bool),
    /// Unsigned 8 bit.
    U8(u8),
    /// Unsigned 16 bit.
    U16(u16),
    /// Unsigned 32 bit.
    U32(u32),
    /// Unsigned 64 bit.
    U64(u64),
    /// Signed 8 bit.
    I8(i8),
    /// Signed 16 bit.
    I16(i16),
    /// Signed 32 bit.
    I32(i32),
    /// Signed 64 bit.
    I64(i64),
    /// Octet string.
    Octet(Bytes),
    /// Timestamp: seconds since the Unix epoch, wrapped in the SML_Time
    /// choice on the wire.
    Timestamp(u32),
}

impl SmlValue {
    /// Build an octet value from a byte slice.
    #[must_use]
    pub fn octet(bytes: &[u8]) -> Self {
        Self::Octet(Bytes::copy_from_slice(bytes))
    }

    /// Build an octet value from a string.
    #[must_use]
    pub fn string(text: &str) -> Self {
        Self::Octet(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Octet content as UTF-8 text, if this is a decodable octet string.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Octet(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
            _ => None,
        }
    }

    /// Numeric content widened to u64, if unsigned.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric content widened to i64, signed or unsigned.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            other => other.as_u64().and_then(|v| i64::try_from(v).ok()),
        }
    }
}

/// TLV encoder over a growable buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    out: BytesMut,
}

impl Encoder {
    /// Fresh empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish and take the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.out.freeze()
    }

    /// Bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.out
    }

    /// Write a scalar tag for `content_len` content bytes.
    fn scalar_tl(&mut self, ty: u8, content_len: usize) {
        // Total length includes the tag bytes themselves; the number of
        // tag bytes in turn depends on the total. Smallest fit wins.
        let mut tag_bytes = 1usize;
        while tag_bytes < 8 && content_len + tag_bytes >= 1usize << (4 * tag_bytes) {
            tag_bytes += 1;
        }
        let total = content_len + tag_bytes;
        for i in (0..tag_bytes).rev() {
            let nibble = ((total >> (4 * i)) & 0x0F) as u8;
            let mut byte = nibble;
            if i + 1 == tag_bytes {
                byte |= ty << 4;
            }
            if i > 0 {
                byte |= 0x80;
            }
            self.out.put_u8(byte);
        }
    }

    /// Open a list of `count` elements.
    pub fn list(&mut self, count: usize) {
        let mut tag_bytes = 1usize;
        while tag_bytes < 8 && count >= 1usize << (4 * tag_bytes) {
            tag_bytes += 1;
        }
        for i in (0..tag_bytes).rev() {
            let nibble = ((count >> (4 * i)) & 0x0F) as u8;
            let mut byte = nibble;
            if i + 1 == tag_bytes {
                byte |= TYPE_LIST << 4;
            }
            if i > 0 {
                byte |= 0x80;
            }
            self.out.put_u8(byte);
        }
    }

    /// Write the "not set" marker.
    pub fn none(&mut self) {
        self.out.put_u8(NOT_SET);
    }

    /// Write the end-of-message marker.
    pub fn end_of_message(&mut self) {
        self.out.put_u8(END_OF_MESSAGE);
    }

    /// Write an octet string.
    pub fn octet(&mut self, bytes: &[u8]) {
        self.scalar_tl(TYPE_OCTET, bytes.len());
        self.out.put_slice(bytes);
    }

    /// Write an optional octet string.
    pub fn octet_opt(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            Some(b) => self.octet(b),
            None => self.none(),
        }
    }

    /// Write an optional string as octets.
    pub fn string_opt(&mut self, text: Option<&str>) {
        self.octet_opt(text.map(str::as_bytes));
    }

    /// Write a boolean.
    pub fn bool(&mut self, value: bool) {
        self.scalar_tl(TYPE_BOOL, 1);
        self.out.put_u8(if value { 0xFF } else { 0x00 });
    }

    /// Write an unsigned 8-bit integer.
    pub fn u8(&mut self, value: u8) {
        self.scalar_tl(TYPE_UINT, 1);
        self.out.put_u8(value);
    }

    /// Write an unsigned 16-bit integer.
    pub fn u16(&mut self, value: u16) {
        self.scalar_tl(TYPE_UINT, 2);
        self.out.put_u16(value);
    }

    /// Write an unsigned 32-bit integer.
    pub fn u32(&mut self, value: u32) {
        self.scalar_tl(TYPE_UINT, 4);
        self.out.put_u32(value);
    }

    /// Write an unsigned 64-bit integer.
    pub fn u64(&mut self, value: u64) {
        self.scalar_tl(TYPE_UINT, 8);
        self.out.put_u64(value);
    }

    /// Write a signed 8-bit integer.
    pub fn i8(&mut self, value: i8) {
        self.scalar_tl(TYPE_INT, 1);
        self.out.put_i8(value);
    }

    /// Write a signed 16-bit integer.
    pub fn i16(&mut self, value: i16) {
        self.scalar_tl(TYPE_INT, 2);
        self.out.put_i16(value);
    }

    /// Write a signed 32-bit integer.
    pub fn i32(&mut self, value: i32) {
        self.scalar_tl(TYPE_INT, 4);
        self.out.put_i32(value);
    }

    /// Write a signed 64-bit integer.
    pub fn i64(&mut self, value: i64) {
        self.scalar_tl(TYPE_INT, 8);
        self.out.put_i64(value);
    }

    /// Write an optional SML_Time (choice tag 2, absolute timestamp).
    pub fn time_opt(&mut self, seconds: Option<u32>) {
        match seconds {
            Some(secs) => {
                self.list(2);
                self.u8(TIME_TIMESTAMP);
                self.u32(secs);
            },
            None => self.none(),
        }
    }

    /// Write any scalar value.
    pub fn value(&mut self, value: &SmlValue) {
        match value {
            SmlValue::None => self.none(),
            SmlValue::Bool(v) => self.bool(*v),
            SmlValue::U8(v) => self.u8(*v),
            SmlValue::U16(v) => self.u16(*v),
            SmlValue::U32(v) => self.u32(*v),
            SmlValue::U64(v) => self.u64(*v),
            SmlValue::I8(v) => self.i8(*v),
            SmlValue::I16(v) => self.i16(*v),
            SmlValue::I32(v) => self.i32(*v),
            SmlValue::I64(v) => self.i64(*v),
            SmlValue::Octet(bytes) => self.octet(bytes),
            SmlValue::Timestamp(secs) => self.time_opt(Some(*secs)),
        }
    }

    /// Append raw, already encoded bytes.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.out.put_slice(bytes);
    }
}

/// TLV decoder over a byte slice.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Decode from the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Remaining byte count.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Raw slice between two previously observed offsets.
    #[must_use]
    pub fn slice(&self, from: usize, to: usize) -> &'a [u8] {
        &self.buf[from.min(self.buf.len())..to.min(self.buf.len())]
    }

    /// Peek at the next byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn byte(&mut self) -> Result<u8, SmlError> {
        let b = *self.buf.get(self.pos).ok_or(SmlError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SmlError> {
        if self.remaining() < n {
            return Err(SmlError::Truncated(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a tag field: `(type, length, tag_byte_count)`.
    ///
    /// For scalar types `length` still includes the tag bytes; callers
    /// subtract `tag_byte_count` for the content size.
    fn read_tl(&mut self) -> Result<(u8, usize, usize), SmlError> {
        let start = self.pos;
        let first = self.byte()?;
        let ty = (first >> 4) & 0x07;
        let mut len = usize::from(first & 0x0F);
        let mut cont = first & 0x80 != 0;
        let mut tag_bytes = 1usize;
        while cont {
            let next = self.byte()?;
            if next & 0x70 != 0 {
                return Err(SmlError::InvalidTl { tl: next, pos: self.pos - 1 });
            }
            len = (len << 4) | usize::from(next & 0x0F);
            cont = next & 0x80 != 0;
            tag_bytes += 1;
            if tag_bytes > 8 {
                return Err(SmlError::InvalidTl { tl: first, pos: start });
            }
        }
        Ok((ty, len, tag_bytes))
    }

    /// Expect a list, returning its element count.
    pub fn list(&mut self) -> Result<usize, SmlError> {
        let pos = self.pos;
        let (ty, len, _) = self.read_tl()?;
        if ty != TYPE_LIST {
            return Err(SmlError::UnexpectedType { expected: TYPE_LIST, found: ty, pos });
        }
        Ok(len)
    }

    /// Expect a list with exactly `expected` elements.
    pub fn list_of(&mut self, expected: usize) -> Result<(), SmlError> {
        let count = self.list()?;
        if count != expected {
            return Err(SmlError::Malformed("unexpected list arity"));
        }
        Ok(())
    }

    /// Expect the end-of-message marker.
    pub fn end_of_message(&mut self) -> Result<(), SmlError> {
        let pos = self.pos;
        match self.byte()? {
            END_OF_MESSAGE => Ok(()),
            tl => Err(SmlError::InvalidTl { tl, pos }),
        }
    }

    /// Read an optional octet string; `0x01` yields `None`.
    pub fn octet(&mut self) -> Result<Option<Bytes>, SmlError> {
        let pos = self.pos;
        let (ty, len, tag_bytes) = self.read_tl()?;
        if ty != TYPE_OCTET {
            return Err(SmlError::UnexpectedType { expected: TYPE_OCTET, found: ty, pos });
        }
        let content = len
            .checked_sub(tag_bytes)
            .ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
        if content == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(self.take(content)?)))
    }

    /// Read a mandatory octet string; "not set" becomes empty bytes.
    pub fn octet_required(&mut self) -> Result<Bytes, SmlError> {
        Ok(self.octet()?.unwrap_or_default())
    }

    /// Read an optional octet string as UTF-8 text (lossy).
    pub fn string(&mut self) -> Result<Option<String>, SmlError> {
        Ok(self.octet()?.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    /// Read an unsigned integer of any width, widened to u64.
    pub fn uint(&mut self) -> Result<u64, SmlError> {
        let pos = self.pos;
        let (ty, len, tag_bytes) = self.read_tl()?;
        if ty != TYPE_UINT {
            return Err(SmlError::UnexpectedType { expected: TYPE_UINT, found: ty, pos });
        }
        let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
        if content == 0 || content > 8 {
            return Err(SmlError::ScalarWidth { len: content, pos });
        }
        let mut value = 0u64;
        for &b in self.take(content)? {
            value = (value << 8) | u64::from(b);
        }
        Ok(value)
    }

    /// Read an optional unsigned integer.
    pub fn uint_opt(&mut self) -> Result<Option<u64>, SmlError> {
        if self.peek() == Some(NOT_SET) {
            self.pos += 1;
            return Ok(None);
        }
        self.uint().map(Some)
    }

    /// Read an unsigned integer that must fit u8.
    pub fn u8(&mut self) -> Result<u8, SmlError> {
        let pos = self.pos;
        let v = self.uint()?;
        u8::try_from(v).map_err(|_| SmlError::ScalarWidth { len: 8, pos })
    }

    /// Read an unsigned integer that must fit u16.
    pub fn u16(&mut self) -> Result<u16, SmlError> {
        let pos = self.pos;
        let v = self.uint()?;
        u16::try_from(v).map_err(|_| SmlError::ScalarWidth { len: 8, pos })
    }

    /// Read an unsigned integer that must fit u32.
    pub fn u32(&mut self) -> Result<u32, SmlError> {
        let pos = self.pos;
        let v = self.uint()?;
        u32::try_from(v).map_err(|_| SmlError::ScalarWidth { len: 8, pos })
    }

    /// Read a signed integer of any width, sign-extended to i64.
    pub fn int(&mut self) -> Result<i64, SmlError> {
        let pos = self.pos;
        let (ty, len, tag_bytes) = self.read_tl()?;
        if ty != TYPE_INT {
            return Err(SmlError::UnexpectedType { expected: TYPE_INT, found: ty, pos });
        }
        let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
        if content == 0 || content > 8 {
            return Err(SmlError::ScalarWidth { len: content, pos });
        }
        let bytes = self.take(content)?;
        let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for &b in bytes {
            value = (value << 8) | i64::from(b);
        }
        Ok(value)
    }

    /// Read a signed integer that must fit i8.
    pub fn i8(&mut self) -> Result<i8, SmlError> {
        let pos = self.pos;
        let v = self.int()?;
        i8::try_from(v).map_err(|_| SmlError::ScalarWidth { len: 8, pos })
    }

    /// Read an optional SML_Time, returned as epoch seconds.
    ///
    /// Both choice tags (seconds index and absolute timestamp) decode to
    /// the carried u32.
    pub fn time(&mut self) -> Result<Option<u32>, SmlError> {
        if self.peek() == Some(NOT_SET) {
            self.pos += 1;
            return Ok(None);
        }
        self.list_of(2)?;
        let tag = self.u8()?;
        if tag != TIME_SEC_INDEX && tag != TIME_TIMESTAMP {
            return Err(SmlError::Malformed("unknown SML_Time choice"));
        }
        Ok(Some(self.u32()?))
    }

    /// Read any scalar value.
    ///
    /// A two-element list is interpreted as an SML_Time choice; other
    /// lists are not values.
    pub fn value(&mut self) -> Result<SmlValue, SmlError> {
        let pos = self.pos;
        if self.peek() == Some(NOT_SET) {
            self.pos += 1;
            return Ok(SmlValue::None);
        }
        let (ty, len, tag_bytes) = self.read_tl()?;
        match ty {
            TYPE_OCTET => {
                let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
                Ok(SmlValue::Octet(Bytes::copy_from_slice(self.take(content)?)))
            },
            TYPE_BOOL => {
                let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
                if content != 1 {
                    return Err(SmlError::ScalarWidth { len: content, pos });
                }
                Ok(SmlValue::Bool(self.byte()? != 0))
            },
            TYPE_UINT => {
                let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
                if content == 0 || content > 8 {
                    return Err(SmlError::ScalarWidth { len: content, pos });
                }
                let mut value = 0u64;
                for &b in self.take(content)? {
                    value = (value << 8) | u64::from(b);
                }
                Ok(match content {
                    1 => SmlValue::U8(value as u8),
                    2 => SmlValue::U16(value as u16),
                    3 | 4 => SmlValue::U32(value as u32),
                    _ => SmlValue::U64(value),
                })
            },
            TYPE_INT => {
                let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
                if content == 0 || content > 8 {
                    return Err(SmlError::ScalarWidth { len: content, pos });
                }
                let bytes = self.take(content)?;
                let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
                for &b in bytes {
                    value = (value << 8) | i64::from(b);
                }
                Ok(match content {
                    1 => SmlValue::I8(value as i8),
                    2 => SmlValue::I16(value as i16),
                    3 | 4 => SmlValue::I32(value as i32),
                    _ => SmlValue::I64(value),
                })
            },
            TYPE_LIST => {
                if len != 2 {
                    return Err(SmlError::Malformed("list is not a value"));
                }
                let tag = self.u8()?;
                if tag != TIME_SEC_INDEX && tag != TIME_TIMESTAMP {
                    return Err(SmlError::Malformed("unknown SML_Time choice"));
                }
                Ok(SmlValue::Timestamp(self.u32()?))
            },
            _ => Err(SmlError::InvalidTl { tl: self.buf[pos], pos }),
        }
    }

    /// Read an optional scalar value; `0x01` yields `None`.
    pub fn value_opt(&mut self) -> Result<Option<SmlValue>, SmlError> {
        if self.peek() == Some(NOT_SET) {
            self.pos += 1;
            return Ok(None);
        }
        self.value().map(Some)
    }

    /// Skip one element, descending into lists.
    pub fn skip(&mut self) -> Result<(), SmlError> {
        self.skip_depth(0)
    }

    fn skip_depth(&mut self, depth: usize) -> Result<(), SmlError> {
        if depth > super::MAX_TREE_DEPTH {
            return Err(SmlError::DepthExceeded);
        }
        let pos = self.pos;
        let (ty, len, tag_bytes) = self.read_tl()?;
        if ty == TYPE_LIST {
            for _ in 0..len {
                self.skip_depth(depth + 1)?;
            }
            return Ok(());
        }
        let content = len.checked_sub(tag_bytes).ok_or(SmlError::InvalidTl { tl: self.buf[pos], pos })?;
        self.take(content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn encode_value(value: &SmlValue) -> Bytes {
        let mut enc = Encoder::new();
        enc.value(value);
        enc.into_bytes()
    }

    #[test]
    fn not_set_is_one_byte() {
        assert_eq!(encode_value(&SmlValue::None).as_ref(), &[0x01]);
    }

    #[test]
    fn empty_list_is_0x70() {
        let mut enc = Encoder::new();
        enc.list(0);
        assert_eq!(enc.into_bytes().as_ref(), &[0x70]);
    }

    #[test]
    fn u16_layout() {
        // Tag 0x63: type 6, total length 3 (tag + two content bytes)
        assert_eq!(encode_value(&SmlValue::U16(0x7AC7)).as_ref(), &[0x63, 0x7A, 0xC7]);
    }

    #[test]
    fn long_octet_uses_extended_tag() {
        let payload = vec![0xAB; 20];
        let mut enc = Encoder::new();
        enc.octet(&payload);
        let wire = enc.into_bytes();
        // 20 content + 2 tag bytes = 22 = 0x16: tag bytes 0x81 0x06
        assert_eq!(&wire[..2], &[0x81, 0x06]);

        let mut dec = Decoder::new(&wire);
        assert_eq!(dec.octet().unwrap().unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn golden_list_entry_scalars() {
        // unit/scaler/value bytes of a captured GetList.Res entry
        let wire = [0x62, 0x1E, 0x52, 0xFF, 0x56, 0x00, 0x09, 0xCB, 0x5B, 0xBF];
        let mut dec = Decoder::new(&wire);
        assert_eq!(dec.value().unwrap(), SmlValue::U8(30));
        assert_eq!(dec.value().unwrap(), SmlValue::I8(-1));
        assert_eq!(dec.value().unwrap(), SmlValue::I64(164_322_239));
    }

    #[test]
    fn sign_extension() {
        let wire = [0x52, 0xFF];
        let mut dec = Decoder::new(&wire);
        assert_eq!(dec.int().unwrap(), -1);
    }

    #[test]
    fn truncated_scalar_is_reported() {
        let wire = [0x65, 0x00, 0x01];
        let mut dec = Decoder::new(&wire);
        assert!(matches!(dec.u32(), Err(SmlError::Truncated(_))));
    }

    #[test]
    fn time_round_trip() {
        let mut enc = Encoder::new();
        enc.time_opt(Some(1_600_000_000));
        enc.time_opt(None);
        let wire = enc.into_bytes();
        let mut dec = Decoder::new(&wire);
        assert_eq!(dec.time().unwrap(), Some(1_600_000_000));
        assert_eq!(dec.time().unwrap(), None);
    }

    fn arb_value() -> impl Strategy<Value = SmlValue> {
        prop_oneof![
            Just(SmlValue::None),
            any::<bool>().prop_map(SmlValue::Bool),
            any::<u8>().prop_map(SmlValue::U8),
            any::<u16>().prop_map(SmlValue::U16),
            any::<u32>().prop_map(SmlValue::U32),
            any::<u64>().prop_map(SmlValue::U64),
            any::<i8>().prop_map(SmlValue::I8),
            any::<i16>().prop_map(SmlValue::I16),
            any::<i32>().prop_map(SmlValue::I32),
            any::<i64>().prop_map(SmlValue::I64),
            proptest::collection::vec(any::<u8>(), 1..300)
                .prop_map(|v| SmlValue::Octet(Bytes::from(v))),
            any::<u32>().prop_map(SmlValue::Timestamp),
        ]
    }

    proptest! {
        #[test]
        fn value_round_trip(value in arb_value()) {
            let wire = encode_value(&value);
            let mut dec = Decoder::new(&wire);
            prop_assert_eq!(dec.value().unwrap(), value);
            prop_assert_eq!(dec.remaining(), 0);
        }

        #[test]
        fn skip_consumes_exactly_one_element(value in arb_value()) {
            let wire = encode_value(&value);
            let mut dec = Decoder::new(&wire);
            dec.skip().unwrap();
            prop_assert_eq!(dec.remaining(), 0);
        }
    }
}
