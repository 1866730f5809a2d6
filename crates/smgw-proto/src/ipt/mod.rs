//! IP-T tunnelling protocol.
//!
//! IP-T frames the traffic between a gateway and the back office. Every
//! frame is `len:u32 | cmd:u16 | seq:u8 | 0x00 | body`, little-endian,
//! with `len` covering the whole frame. The byte stream may additionally
//! be scrambled with a 32-byte XOR key (see `smgw_crypto::Scrambler`).
//!
//! Submodules: [`codec`] (frame encode/streaming decode), [`payload`]
//! (per-command body builders and readers), [`response`] (response-code
//! enums with their success predicates) and [`stream`] (the scrambled
//! serializer/parser pair a session owns).

pub mod codec;
pub mod payload;
pub mod response;
pub mod stream;

use thiserror::Error;

pub use codec::{FrameReader, HEADER_SIZE, encode_frame};
pub use stream::{ScrambledReader, ScrambledWriter};

/// Errors raised by the IP-T codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IptError {
    /// A frame header announced less than the header size.
    #[error("frame length {0} is below the header size")]
    LengthTooSmall(u32),

    /// A frame header announced more than the permitted maximum.
    #[error("frame length {0} exceeds the maximum frame size")]
    LengthTooLarge(u32),

    /// A command body did not match its expected layout.
    #[error("malformed {command} body: {detail}")]
    MalformedBody {
        /// Command whose body failed to decode
        command: &'static str,
        /// What was wrong
        detail: &'static str,
    },
}

/// IP-T command codes.
///
/// Requests carry bit 15; the matching response clears it. Control
/// commands occupy the `0xC0xx`/`0x40xx` range, transport commands
/// `0x90xx`/`0x10xx`, application commands `0xA0xx`/`0x20xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)] // names mirror the protocol specification
pub enum Command {
    TpReqOpenPushChannel = 0x9000,
    TpResOpenPushChannel = 0x1000,
    TpReqClosePushChannel = 0x9001,
    TpResClosePushChannel = 0x1001,
    TpReqPushdataTransfer = 0x9002,
    TpResPushdataTransfer = 0x1002,
    TpReqOpenConnection = 0x9003,
    TpResOpenConnection = 0x1003,
    TpReqCloseConnection = 0x9004,
    TpResCloseConnection = 0x1004,

    AppReqProtocolVersion = 0xA000,
    AppResProtocolVersion = 0x2000,
    AppReqSoftwareVersion = 0xA001,
    AppResSoftwareVersion = 0x2001,
    AppReqDeviceIdentifier = 0xA003,
    AppResDeviceIdentifier = 0x2003,
    AppReqNetworkStatus = 0xA004,
    AppResNetworkStatus = 0x2004,
    AppReqIpStatistics = 0xA005,
    AppResIpStatistics = 0x2005,
    AppReqDeviceTime = 0xA007,
    AppResDeviceTime = 0x2007,
    AppReqPushTargetNamelist = 0xA008,
    AppResPushTargetNamelist = 0x2008,
    AppReqPushTargetEcho = 0xA009,
    AppResPushTargetEcho = 0x2009,
    AppReqTraceroute = 0xA00A,
    AppResTraceroute = 0x200A,

    CtrlReqLoginPublic = 0xC001,
    CtrlResLoginPublic = 0x4001,
    CtrlReqLoginScrambled = 0xC002,
    CtrlResLoginScrambled = 0x4002,
    MaintenanceRequest = 0xC003,
    MaintenanceResponse = 0x4003,
    CtrlReqLogout = 0xC004,
    CtrlResLogout = 0x4004,
    CtrlReqRegisterTarget = 0xC005,
    CtrlResRegisterTarget = 0x4005,
    CtrlReqDeregisterTarget = 0xC006,
    CtrlResDeregisterTarget = 0x4006,
    CtrlReqWatchdog = 0xC008,
    CtrlResWatchdog = 0x4008,

    Unknown = 0x7FFF,
}

impl Command {
    /// Map a wire code; unassigned codes yield [`Command::Unknown`].
    #[must_use]
    pub fn from_u16(code: u16) -> Self {
        match code {
            0x9000 => Self::TpReqOpenPushChannel,
            0x1000 => Self::TpResOpenPushChannel,
            0x9001 => Self::TpReqClosePushChannel,
            0x1001 => Self::TpResClosePushChannel,
            0x9002 => Self::TpReqPushdataTransfer,
            0x1002 => Self::TpResPushdataTransfer,
            0x9003 => Self::TpReqOpenConnection,
            0x1003 => Self::TpResOpenConnection,
            0x9004 => Self::TpReqCloseConnection,
            0x1004 => Self::TpResCloseConnection,
            0xA000 => Self::AppReqProtocolVersion,
            0x2000 => Self::AppResProtocolVersion,
            0xA001 => Self::AppReqSoftwareVersion,
            0x2001 => Self::AppResSoftwareVersion,
            0xA003 => Self::AppReqDeviceIdentifier,
            0x2003 => Self::AppResDeviceIdentifier,
            0xA004 => Self::AppReqNetworkStatus,
            0x2004 => Self::AppResNetworkStatus,
            0xA005 => Self::AppReqIpStatistics,
            0x2005 => Self::AppResIpStatistics,
            0xA007 => Self::AppReqDeviceTime,
            0x2007 => Self::AppResDeviceTime,
            0xA008 => Self::AppReqPushTargetNamelist,
            0x2008 => Self::AppResPushTargetNamelist,
            0xA009 => Self::AppReqPushTargetEcho,
            0x2009 => Self::AppResPushTargetEcho,
            0xA00A => Self::AppReqTraceroute,
            0x200A => Self::AppResTraceroute,
            0xC001 => Self::CtrlReqLoginPublic,
            0x4001 => Self::CtrlResLoginPublic,
            0xC002 => Self::CtrlReqLoginScrambled,
            0x4002 => Self::CtrlResLoginScrambled,
            0xC003 => Self::MaintenanceRequest,
            0x4003 => Self::MaintenanceResponse,
            0xC004 => Self::CtrlReqLogout,
            0x4004 => Self::CtrlResLogout,
            0xC005 => Self::CtrlReqRegisterTarget,
            0x4005 => Self::CtrlResRegisterTarget,
            0xC006 => Self::CtrlReqDeregisterTarget,
            0x4006 => Self::CtrlResDeregisterTarget,
            0xC008 => Self::CtrlReqWatchdog,
            0x4008 => Self::CtrlResWatchdog,
            _ => Self::Unknown,
        }
    }

    /// Wire code.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Whether this is a request (bit 15 set).
    #[must_use]
    pub fn is_request(self) -> bool {
        self.to_u16() & 0x8000 != 0
    }

    /// Command name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TpReqOpenPushChannel => "TP_REQ_OPEN_PUSH_CHANNEL",
            Self::TpResOpenPushChannel => "TP_RES_OPEN_PUSH_CHANNEL",
            Self::TpReqClosePushChannel => "TP_REQ_CLOSE_PUSH_CHANNEL",
            Self::TpResClosePushChannel => "TP_RES_CLOSE_PUSH_CHANNEL",
            Self::TpReqPushdataTransfer => "TP_REQ_PUSHDATA_TRANSFER",
            Self::TpResPushdataTransfer => "TP_RES_PUSHDATA_TRANSFER",
            Self::TpReqOpenConnection => "TP_REQ_OPEN_CONNECTION",
            Self::TpResOpenConnection => "TP_RES_OPEN_CONNECTION",
            Self::TpReqCloseConnection => "TP_REQ_CLOSE_CONNECTION",
            Self::TpResCloseConnection => "TP_RES_CLOSE_CONNECTION",
            Self::AppReqProtocolVersion => "APP_REQ_PROTOCOL_VERSION",
            Self::AppResProtocolVersion => "APP_RES_PROTOCOL_VERSION",
            Self::AppReqSoftwareVersion => "APP_REQ_SOFTWARE_VERSION",
            Self::AppResSoftwareVersion => "APP_RES_SOFTWARE_VERSION",
            Self::AppReqDeviceIdentifier => "APP_REQ_DEVICE_IDENTIFIER",
            Self::AppResDeviceIdentifier => "APP_RES_DEVICE_IDENTIFIER",
            Self::AppReqNetworkStatus => "APP_REQ_NETWORK_STATUS",
            Self::AppResNetworkStatus => "APP_RES_NETWORK_STATUS",
            Self::AppReqIpStatistics => "APP_REQ_IP_STATISTICS",
            Self::AppResIpStatistics => "APP_RES_IP_STATISTICS",
            Self::AppReqDeviceTime => "APP_REQ_DEVICE_TIME",
            Self::AppResDeviceTime => "APP_RES_DEVICE_TIME",
            Self::AppReqPushTargetNamelist => "APP_REQ_PUSH_TARGET_NAMELIST",
            Self::AppResPushTargetNamelist => "APP_RES_PUSH_TARGET_NAMELIST",
            Self::AppReqPushTargetEcho => "APP_REQ_PUSH_TARGET_ECHO",
            Self::AppResPushTargetEcho => "APP_RES_PUSH_TARGET_ECHO",
            Self::AppReqTraceroute => "APP_REQ_TRACEROUTE",
            Self::AppResTraceroute => "APP_RES_TRACEROUTE",
            Self::CtrlReqLoginPublic => "CTRL_REQ_LOGIN_PUBLIC",
            Self::CtrlResLoginPublic => "CTRL_RES_LOGIN_PUBLIC",
            Self::CtrlReqLoginScrambled => "CTRL_REQ_LOGIN_SCRAMBLED",
            Self::CtrlResLoginScrambled => "CTRL_RES_LOGIN_SCRAMBLED",
            Self::MaintenanceRequest => "MAINTENANCE_REQUEST",
            Self::MaintenanceResponse => "MAINTENANCE_RESPONSE",
            Self::CtrlReqLogout => "CTRL_REQ_LOGOUT",
            Self::CtrlResLogout => "CTRL_RES_LOGOUT",
            Self::CtrlReqRegisterTarget => "CTRL_REQ_REGISTER_TARGET",
            Self::CtrlResRegisterTarget => "CTRL_RES_REGISTER_TARGET",
            Self::CtrlReqDeregisterTarget => "CTRL_REQ_DEREGISTER_TARGET",
            Self::CtrlResDeregisterTarget => "CTRL_RES_DEREGISTER_TARGET",
            Self::CtrlReqWatchdog => "CTRL_REQ_WATCHDOG",
            Self::CtrlResWatchdog => "CTRL_RES_WATCHDOG",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Command, [`Command::Unknown`] for unassigned codes.
    pub command: Command,
    /// Raw command code as found on the wire.
    pub raw_command: u16,
    /// Sequence number pairing requests with responses.
    pub sequence: u8,
}

/// Per-session sequence number source.
///
/// Sequence numbers are monotonically increasing and wrap from `0xFF`
/// back to `0x01` — zero is never assigned.
#[derive(Debug, Clone, Default)]
pub struct SequenceGenerator {
    last: u8,
}

impl SequenceGenerator {
    /// Fresh generator; the first assigned sequence is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequence number.
    pub fn assign(&mut self) -> u8 {
        self.last = if self.last == 0xFF { 0x01 } else { self.last + 1 };
        self.last
    }

    /// Most recently assigned sequence, 0 before the first assignment.
    #[must_use]
    pub fn last(&self) -> u8 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trip() {
        for code in [0x9000u16, 0x1002, 0xC001, 0x4006, 0xA001, 0x2008] {
            assert_eq!(Command::from_u16(code).to_u16(), code);
        }
    }

    #[test]
    fn unassigned_code_maps_to_unknown() {
        assert_eq!(Command::from_u16(0xBEEF), Command::Unknown);
    }

    #[test]
    fn request_bit() {
        assert!(Command::CtrlReqLoginPublic.is_request());
        assert!(!Command::CtrlResLoginPublic.is_request());
    }

    #[test]
    fn sequence_wraps_to_one() {
        let mut seq = SequenceGenerator::new();
        assert_eq!(seq.assign(), 1);
        for _ in 0..253 {
            seq.assign();
        }
        assert_eq!(seq.assign(), 0xFF);
        // Zero is skipped on wrap
        assert_eq!(seq.assign(), 0x01);
    }
}
