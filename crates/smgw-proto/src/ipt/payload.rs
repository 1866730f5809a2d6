//! IP-T command bodies.
//!
//! Every body is little-endian with null-terminated strings. Each struct
//! encodes to raw body bytes and decodes from them; the frame layer adds
//! the header.

use bytes::{BufMut, Bytes, BytesMut};
use smgw_crypto::{SCRAMBLE_KEY_SIZE, ScrambleKey};

use super::IptError;

/// Cursor over a command body.
#[derive(Debug)]
struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
    command: &'static str,
}

impl<'a> BodyReader<'a> {
    fn new(buf: &'a [u8], command: &'static str) -> Self {
        Self { buf, pos: 0, command }
    }

    fn err(&self, detail: &'static str) -> IptError {
        IptError::MalformedBody { command: self.command, detail }
    }

    fn u8(&mut self) -> Result<u8, IptError> {
        let b = *self.buf.get(self.pos).ok_or_else(|| self.err("unexpected end of body"))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, IptError> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32, IptError> {
        let mut bytes = [0u8; 4];
        for b in &mut bytes {
            *b = self.u8()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64, IptError> {
        let mut bytes = [0u8; 8];
        for b in &mut bytes {
            *b = self.u8()?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    fn string(&mut self) -> Result<String, IptError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.err("unterminated string"))?;
        let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(text)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IptError> {
        if self.buf.len() - self.pos < n {
            return Err(self.err("unexpected end of body"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn finish(self) -> Result<(), IptError> {
        if self.pos != self.buf.len() {
            return Err(self.err("trailing bytes"));
        }
        Ok(())
    }
}

fn put_string(out: &mut BytesMut, text: &str) {
    out.put_slice(text.as_bytes());
    out.put_u8(0);
}

/// Public login request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPublicReq {
    /// Account name.
    pub name: String,
    /// Account password.
    pub pwd: String,
}

impl LoginPublicReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.name);
        put_string(&mut out, &self.pwd);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_REQ_LOGIN_PUBLIC");
        let name = r.string()?;
        let pwd = r.string()?;
        r.finish()?;
        Ok(Self { name, pwd })
    }
}

/// Scrambled login request carrying the next scramble key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginScrambledReq {
    /// Account name.
    pub name: String,
    /// Account password.
    pub pwd: String,
    /// Key the client switches the stream to.
    pub sk: ScrambleKey,
}

impl LoginScrambledReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.name);
        put_string(&mut out, &self.pwd);
        out.put_slice(self.sk.as_bytes());
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_REQ_LOGIN_SCRAMBLED");
        let name = r.string()?;
        let pwd = r.string()?;
        let key: [u8; SCRAMBLE_KEY_SIZE] = r
            .take(SCRAMBLE_KEY_SIZE)?
            .try_into()
            .map_err(|_| r.err("scramble key size"))?;
        r.finish()?;
        Ok(Self { name, pwd, sk: ScrambleKey::new(key) })
    }
}

/// Login response (public and scrambled share the layout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRes {
    /// Response code, see [`super::response::LoginCode`].
    pub code: u8,
    /// Watchdog period in minutes, 0 disables the watchdog.
    pub watchdog: u16,
    /// Redirect address for `NEW_ADDRESS` responses.
    pub redirect: String,
}

impl LoginRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u16_le(self.watchdog);
        put_string(&mut out, &self.redirect);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_RES_LOGIN");
        let code = r.u8()?;
        let watchdog = r.u16()?;
        let redirect = r.string()?;
        r.finish()?;
        Ok(Self { code, watchdog, redirect })
    }
}

/// Logout response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutRes {
    /// Response code.
    pub code: u8,
}

impl LogoutRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.code])
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_RES_LOGOUT");
        let code = r.u8()?;
        r.finish()?;
        Ok(Self { code })
    }
}

/// Push target registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTargetReq {
    /// Target name, e.g. `power@solostec`.
    pub target: String,
    /// Maximum packet size the owner accepts.
    pub packet_size: u16,
    /// Window size, almost always 1.
    pub window_size: u8,
}

impl RegisterTargetReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.target);
        out.put_u16_le(self.packet_size);
        out.put_u8(self.window_size);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_REQ_REGISTER_TARGET");
        let target = r.string()?;
        let packet_size = r.u16()?;
        let window_size = r.u8()?;
        r.finish()?;
        Ok(Self { target, packet_size, window_size })
    }
}

/// Push target registration response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterTargetRes {
    /// Response code.
    pub code: u8,
    /// Channel id the server allocated for the target.
    pub channel: u32,
}

impl RegisterTargetRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u32_le(self.channel);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_RES_REGISTER_TARGET");
        let code = r.u8()?;
        let channel = r.u32()?;
        r.finish()?;
        Ok(Self { code, channel })
    }
}

/// Push target deregistration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterTargetReq {
    /// Target name.
    pub target: String,
}

impl DeregisterTargetReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.target);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_REQ_DEREGISTER_TARGET");
        let target = r.string()?;
        r.finish()?;
        Ok(Self { target })
    }
}

/// Push target deregistration response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterTargetRes {
    /// Response code.
    pub code: u8,
    /// Echoed target name.
    pub target: String,
}

impl DeregisterTargetRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        put_string(&mut out, &self.target);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "CTRL_RES_DEREGISTER_TARGET");
        let code = r.u8()?;
        let target = r.string()?;
        r.finish()?;
        Ok(Self { code, target })
    }
}

/// Open push channel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPushChannelReq {
    /// Target name the channel binds to.
    pub target: String,
    /// Account selector, may be empty.
    pub account: String,
    /// MSISDN selector, may be empty.
    pub msisdn: String,
    /// Version selector, may be empty.
    pub version: String,
    /// Device id selector, may be empty.
    pub device_id: String,
    /// Timeout in seconds.
    pub timeout: u16,
}

impl OpenPushChannelReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.target);
        put_string(&mut out, &self.account);
        put_string(&mut out, &self.msisdn);
        put_string(&mut out, &self.version);
        put_string(&mut out, &self.device_id);
        out.put_u16_le(self.timeout);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_REQ_OPEN_PUSH_CHANNEL");
        let target = r.string()?;
        let account = r.string()?;
        let msisdn = r.string()?;
        let version = r.string()?;
        let device_id = r.string()?;
        let timeout = r.u16()?;
        r.finish()?;
        Ok(Self { target, account, msisdn, version, device_id, timeout })
    }
}

/// Open push channel response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPushChannelRes {
    /// Response code.
    pub code: u8,
    /// Allocated channel id.
    pub channel: u32,
    /// Allocated source id.
    pub source: u32,
    /// Packet size negotiated with the target owner.
    pub packet_size: u16,
    /// Window size negotiated with the target owner.
    pub window_size: u8,
    /// Channel status byte; the `0xC1` bits carry the live flag.
    pub status: u8,
    /// Number of target sessions behind the channel.
    pub count: u32,
}

impl OpenPushChannelRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u32_le(self.channel);
        out.put_u32_le(self.source);
        out.put_u16_le(self.packet_size);
        out.put_u8(self.window_size);
        out.put_u8(self.status);
        out.put_u32_le(self.count);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_RES_OPEN_PUSH_CHANNEL");
        let res = Self {
            code: r.u8()?,
            channel: r.u32()?,
            source: r.u32()?,
            packet_size: r.u16()?,
            window_size: r.u8()?,
            status: r.u8()?,
            count: r.u32()?,
        };
        r.finish()?;
        Ok(res)
    }
}

/// Close push channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePushChannelReq {
    /// Channel id to close.
    pub channel: u32,
}

impl ClosePushChannelReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.channel.to_le_bytes())
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_REQ_CLOSE_PUSH_CHANNEL");
        let channel = r.u32()?;
        r.finish()?;
        Ok(Self { channel })
    }
}

/// Close push channel response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePushChannelRes {
    /// Response code.
    pub code: u8,
    /// Echoed channel id.
    pub channel: u32,
}

impl ClosePushChannelRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u32_le(self.channel);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_RES_CLOSE_PUSH_CHANNEL");
        let code = r.u8()?;
        let channel = r.u32()?;
        r.finish()?;
        Ok(Self { code, channel })
    }
}

/// Push data transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDataTransferReq {
    /// Channel id.
    pub channel: u32,
    /// Source id.
    pub source: u32,
    /// Channel status byte; the `0xC1` bits are preserved end to end.
    pub status: u8,
    /// Block counter.
    pub block: u8,
    /// Payload.
    pub data: Bytes,
}

impl PushDataTransferReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(self.channel);
        out.put_u32_le(self.source);
        out.put_u8(self.status);
        out.put_u8(self.block);
        out.put_u32_le(self.data.len() as u32);
        out.put_slice(&self.data);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_REQ_PUSHDATA_TRANSFER");
        let channel = r.u32()?;
        let source = r.u32()?;
        let status = r.u8()?;
        let block = r.u8()?;
        let size = r.u32()? as usize;
        let data = r.take(size)?;
        let data = Bytes::copy_from_slice(data);
        r.finish()?;
        Ok(Self { channel, source, status, block, data })
    }
}

/// Push data transfer response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushDataTransferRes {
    /// Response code.
    pub code: u8,
    /// Echoed channel id.
    pub channel: u32,
    /// Echoed source id.
    pub source: u32,
    /// Echoed status byte.
    pub status: u8,
    /// Echoed block counter.
    pub block: u8,
}

impl PushDataTransferRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u32_le(self.channel);
        out.put_u32_le(self.source);
        out.put_u8(self.status);
        out.put_u8(self.block);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_RES_PUSHDATA_TRANSFER");
        let res = Self {
            code: r.u8()?,
            channel: r.u32()?,
            source: r.u32()?,
            status: r.u8()?,
            block: r.u8()?,
        };
        r.finish()?;
        Ok(res)
    }
}

/// Open connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConnectionReq {
    /// Called address (MSISDN-style number).
    pub address: String,
}

impl OpenConnectionReq {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.address);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "TP_REQ_OPEN_CONNECTION");
        let address = r.string()?;
        r.finish()?;
        Ok(Self { address })
    }
}

/// Response carrying only a response code (open/close connection,
/// maintenance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRes {
    /// Response code.
    pub code: u8,
}

impl CodeRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.code])
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "RES_CODE");
        let code = r.u8()?;
        r.finish()?;
        Ok(Self { code })
    }
}

/// Application response carrying a single string (software version,
/// device identifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRes {
    /// Carried text.
    pub value: String,
}

impl StringRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        put_string(&mut out, &self.value);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "APP_RES_STRING");
        let value = r.string()?;
        r.finish()?;
        Ok(Self { value })
    }
}

/// IP statistics response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpStatisticsRes {
    /// Response code.
    pub code: u8,
    /// Received byte count.
    pub rx: u64,
    /// Sent byte count.
    pub sx: u64,
}

impl IpStatisticsRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u64_le(self.rx);
        out.put_u64_le(self.sx);
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "APP_RES_IP_STATISTICS");
        let res = Self { code: r.u8()?, rx: r.u64()?, sx: r.u64()? };
        r.finish()?;
        Ok(res)
    }
}

/// Push target namelist response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTargetNamelistRes {
    /// Response code.
    pub code: u8,
    /// Registered target names.
    pub targets: Vec<String>,
}

impl PushTargetNamelistRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.code);
        out.put_u32_le(self.targets.len() as u32);
        for target in &self.targets {
            put_string(&mut out, target);
        }
        out.freeze()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "APP_RES_PUSH_TARGET_NAMELIST");
        let code = r.u8()?;
        let count = r.u32()?;
        let mut targets = Vec::with_capacity((count as usize).min(64));
        for _ in 0..count {
            targets.push(r.string()?);
        }
        r.finish()?;
        Ok(Self { code, targets })
    }
}

/// Response to a command the peer does not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCommandRes {
    /// The command code that was not understood.
    pub command: u16,
}

impl UnknownCommandRes {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.command.to_le_bytes())
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "RES_UNKNOWN_COMMAND");
        let command = r.u16()?;
        r.finish()?;
        Ok(Self { command })
    }
}

/// Echoed payload used by the push target echo and traceroute commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPayload {
    /// Opaque bytes echoed back unchanged.
    pub data: Bytes,
}

impl EchoPayload {
    /// Encode the body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        self.data.clone()
    }

    /// Decode the body.
    pub fn decode(body: &[u8]) -> Result<Self, IptError> {
        let mut r = BodyReader::new(body, "ECHO");
        let data = Bytes::copy_from_slice(r.rest());
        r.finish()?;
        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn login_public_round_trip() {
        let req = LoginPublicReq { name: "root".into(), pwd: "root".into() };
        assert_eq!(LoginPublicReq::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn login_scrambled_round_trip() {
        let req = LoginScrambledReq {
            name: "gateway-1".into(),
            pwd: "secret".into(),
            sk: ScrambleKey::new([0x5A; SCRAMBLE_KEY_SIZE]),
        };
        assert_eq!(LoginScrambledReq::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn truncated_scramble_key_is_rejected() {
        let mut body = b"a\0b\0".to_vec();
        body.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            LoginScrambledReq::decode(&body),
            Err(IptError::MalformedBody { .. })
        ));
    }

    #[test]
    fn push_status_live_bits_survive() {
        let req = PushDataTransferReq {
            channel: 9,
            source: 4,
            status: 0xC1,
            block: 0,
            data: Bytes::from_static(&[1, 2, 3]),
        };
        let decoded = PushDataTransferReq::decode(&req.encode()).unwrap();
        assert_eq!(decoded.status & 0xC1, 0xC1);
        assert_eq!(decoded, req);
    }

    #[test]
    fn open_push_channel_round_trip() {
        let res = OpenPushChannelRes {
            code: 1,
            channel: 0x0102_0304,
            source: 0x0A0B_0C0D,
            packet_size: 512,
            window_size: 1,
            status: 0xC1,
            count: 1,
        };
        assert_eq!(OpenPushChannelRes::decode(&res.encode()).unwrap(), res);
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert!(matches!(
            LoginPublicReq::decode(b"no-terminator"),
            Err(IptError::MalformedBody { .. })
        ));
    }

    proptest! {
        #[test]
        fn namelist_round_trip(targets in proptest::collection::vec("[a-z@.]{1,16}", 0..8)) {
            let res = PushTargetNamelistRes { code: 1, targets };
            prop_assert_eq!(PushTargetNamelistRes::decode(&res.encode()).unwrap(), res);
        }

        #[test]
        fn pushdata_round_trip(
            channel in any::<u32>(),
            source in any::<u32>(),
            status in any::<u8>(),
            block in any::<u8>(),
            data in proptest::collection::vec(any::<u8>(), 0..600),
        ) {
            let req = PushDataTransferReq {
                channel, source, status, block, data: Bytes::from(data),
            };
            prop_assert_eq!(PushDataTransferReq::decode(&req.encode()).unwrap(), req);
        }
    }
}
