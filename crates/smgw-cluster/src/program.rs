//! Cluster RPC programs.
//!
//! A program is a string-named function with positional, typed
//! arguments. On the wire: name (length-prefixed), argument count, then
//! one tagged value per argument, little-endian. An optional reply
//! continuation travels as a trailing tag argument by convention.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{TimeZone, Utc};
use smgw_core::cache::CacheValue;
use uuid::Uuid;

use crate::ClusterError;

/// Value tags on the wire.
mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const U8: u8 = 2;
    pub const U16: u8 = 3;
    pub const U32: u8 = 4;
    pub const U64: u8 = 5;
    pub const I64: u8 = 6;
    pub const STR: u8 = 7;
    pub const BYTES: u8 = 8;
    pub const TAG: u8 = 9;
    pub const TS: u8 = 10;
}

/// One remote procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Function name, e.g. `bus.req.subscribe`.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<CacheValue>,
}

impl Program {
    /// Start a program for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), args: Vec::new() }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, value: CacheValue) -> Self {
        self.args.push(value);
        self
    }

    /// Positional argument accessor.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CacheValue> {
        self.args.get(index)
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        let name = self.name.as_bytes();
        out.put_u8(name.len().min(255) as u8);
        out.put_slice(&name[..name.len().min(255)]);
        out.put_u16_le(self.args.len() as u16);
        for value in &self.args {
            encode_value(&mut out, value);
        }
        out.freeze()
    }

    /// Decode from wire bytes.
    pub fn decode(mut buf: &[u8]) -> Result<Self, ClusterError> {
        let err = ClusterError::MalformedProgram("truncated program");
        if buf.is_empty() {
            return Err(err);
        }
        let name_len = usize::from(buf.get_u8());
        if buf.remaining() < name_len {
            return Err(err);
        }
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf.advance(name_len);

        if buf.remaining() < 2 {
            return Err(err);
        }
        let count = usize::from(buf.get_u16_le());
        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            args.push(decode_value(&mut buf)?);
        }
        Ok(Self { name, args })
    }
}

fn encode_value(out: &mut BytesMut, value: &CacheValue) {
    match value {
        CacheValue::Null => out.put_u8(tag::NULL),
        CacheValue::Bool(v) => {
            out.put_u8(tag::BOOL);
            out.put_u8(u8::from(*v));
        },
        CacheValue::U8(v) => {
            out.put_u8(tag::U8);
            out.put_u8(*v);
        },
        CacheValue::U16(v) => {
            out.put_u8(tag::U16);
            out.put_u16_le(*v);
        },
        CacheValue::U32(v) => {
            out.put_u8(tag::U32);
            out.put_u32_le(*v);
        },
        CacheValue::U64(v) => {
            out.put_u8(tag::U64);
            out.put_u64_le(*v);
        },
        CacheValue::I64(v) => {
            out.put_u8(tag::I64);
            out.put_i64_le(*v);
        },
        CacheValue::Str(v) => {
            out.put_u8(tag::STR);
            out.put_u32_le(v.len() as u32);
            out.put_slice(v.as_bytes());
        },
        CacheValue::Bytes(v) => {
            out.put_u8(tag::BYTES);
            out.put_u32_le(v.len() as u32);
            out.put_slice(v);
        },
        CacheValue::Tag(v) => {
            out.put_u8(tag::TAG);
            out.put_slice(v.as_bytes());
        },
        CacheValue::Ts(v) => {
            out.put_u8(tag::TS);
            out.put_i64_le(v.timestamp());
            out.put_u32_le(v.timestamp_subsec_nanos());
        },
    }
}

fn decode_value(buf: &mut &[u8]) -> Result<CacheValue, ClusterError> {
    let err = || ClusterError::MalformedProgram("truncated value");
    if buf.is_empty() {
        return Err(err());
    }
    let tag_byte = buf.get_u8();
    let need = |buf: &&[u8], n: usize| if buf.remaining() < n { Err(err()) } else { Ok(()) };
    Ok(match tag_byte {
        tag::NULL => CacheValue::Null,
        tag::BOOL => {
            need(buf, 1)?;
            CacheValue::Bool(buf.get_u8() != 0)
        },
        tag::U8 => {
            need(buf, 1)?;
            CacheValue::U8(buf.get_u8())
        },
        tag::U16 => {
            need(buf, 2)?;
            CacheValue::U16(buf.get_u16_le())
        },
        tag::U32 => {
            need(buf, 4)?;
            CacheValue::U32(buf.get_u32_le())
        },
        tag::U64 => {
            need(buf, 8)?;
            CacheValue::U64(buf.get_u64_le())
        },
        tag::I64 => {
            need(buf, 8)?;
            CacheValue::I64(buf.get_i64_le())
        },
        tag::STR => {
            need(buf, 4)?;
            let len = buf.get_u32_le() as usize;
            need(buf, len)?;
            let text = String::from_utf8_lossy(&buf[..len]).into_owned();
            buf.advance(len);
            CacheValue::Str(text)
        },
        tag::BYTES => {
            need(buf, 4)?;
            let len = buf.get_u32_le() as usize;
            need(buf, len)?;
            let bytes = buf[..len].to_vec();
            buf.advance(len);
            CacheValue::Bytes(bytes)
        },
        tag::TAG => {
            need(buf, 16)?;
            let mut raw = [0u8; 16];
            raw.copy_from_slice(&buf[..16]);
            buf.advance(16);
            CacheValue::Tag(Uuid::from_bytes(raw))
        },
        tag::TS => {
            need(buf, 12)?;
            let secs = buf.get_i64_le();
            let nanos = buf.get_u32_le();
            let ts = Utc
                .timestamp_opt(secs, nanos)
                .single()
                .ok_or(ClusterError::MalformedProgram("timestamp out of range"))?;
            CacheValue::Ts(ts)
        },
        _ => return Err(ClusterError::MalformedProgram("unknown value tag")),
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arb_value() -> impl Strategy<Value = CacheValue> {
        prop_oneof![
            Just(CacheValue::Null),
            any::<bool>().prop_map(CacheValue::Bool),
            any::<u8>().prop_map(CacheValue::U8),
            any::<u16>().prop_map(CacheValue::U16),
            any::<u32>().prop_map(CacheValue::U32),
            any::<u64>().prop_map(CacheValue::U64),
            any::<i64>().prop_map(CacheValue::I64),
            "[ -~]{0,32}".prop_map(CacheValue::Str),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(CacheValue::Bytes),
            any::<[u8; 16]>().prop_map(|b| CacheValue::Tag(Uuid::from_bytes(b))),
            (0i64..4_000_000_000, 0u32..1_000_000_000).prop_map(|(s, n)| {
                CacheValue::Ts(Utc.timestamp_opt(s, n).single().unwrap())
            }),
        ]
    }

    #[test]
    fn subscribe_program_round_trip() {
        let program = Program::new("bus.req.subscribe")
            .arg(CacheValue::Str("session".into()))
            .arg(CacheValue::Tag(Uuid::new_v4()));
        assert_eq!(Program::decode(&program.encode()).unwrap(), program);
    }

    #[test]
    fn truncated_program_is_rejected() {
        let program = Program::new("bus.req.push.data").arg(CacheValue::U32(9));
        let wire = program.encode();
        for cut in 1..wire.len() {
            assert!(Program::decode(&wire[..cut]).is_err());
        }
    }

    proptest! {
        #[test]
        fn program_round_trip(
            name in "[a-z.]{1,32}",
            args in proptest::collection::vec(arb_value(), 0..12),
        ) {
            let program = Program { name, args };
            prop_assert_eq!(Program::decode(&program.encode()).unwrap(), program);
        }
    }
}
