//! IP-T server session state machine.
//!
//! One instance per accepted TCP connection. Pure and action-based: the
//! driver feeds decoded frames and cluster replies in, executes the
//! returned actions (writes, key switches, cluster requests, table
//! updates) and owns all timers.
//!
//! # State machine
//!
//! ```text
//! ┌───────────┐ login ok ┌────────────┐ open-conn ok ┌────────┐
//! │ Connected │─────────>│ Authorized │─────────────>│ Linked │
//! └───────────┘          └────────────┘<─────────────└────────┘
//!       │ gatekeeper timeout,  │   close-connection        │
//!       │ malformed login      │                           │
//!       ↓                      ↓                           ↓
//!   ┌────────┐            ┌────────┐                  ┌────────┐
//!   │ Closed │            │ Closed │                  │ Closed │
//!   └────────┘            └────────┘                  └────────┘
//! ```
//!
//! Push channels are independent of the point-to-point connection and
//! stay usable in both `Authorized` and `Linked`.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use smgw_crypto::ScrambleKey;
use smgw_proto::ipt::payload::{
    ClosePushChannelReq, ClosePushChannelRes, CodeRes, DeregisterTargetReq, DeregisterTargetRes,
    LoginPublicReq, LoginRes, LoginScrambledReq, OpenConnectionReq, OpenPushChannelReq,
    OpenPushChannelRes, PushDataTransferReq, PushDataTransferRes, RegisterTargetReq,
    RegisterTargetRes, StringRes, UnknownCommandRes,
};
use smgw_proto::ipt::response::{LoginCode, OpenConnectionCode};
use smgw_proto::ipt::{Command, Header, SequenceGenerator};
use uuid::Uuid;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP accepted, login outstanding.
    Connected,
    /// Login accepted by the cluster.
    Authorized,
    /// A point-to-point connection is established.
    Linked,
    /// Terminal.
    Closed,
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time the gatekeeper grants for a successful login.
    pub gatekeeper_timeout: Duration,
    /// Watchdog period sent in login responses, minutes; 0 disables.
    pub watchdog_minutes: u16,
    /// Whether a second open-connection supersedes the existing one.
    pub connection_superseding: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gatekeeper_timeout: Duration::from_secs(30),
            watchdog_minutes: 12,
            connection_superseding: false,
        }
    }
}

/// Inputs to the session state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A decoded, unscrambled frame from the peer.
    Frame {
        /// Frame header.
        header: Header,
        /// Frame body.
        body: Bytes,
    },
    /// Cluster verdict on an outstanding login.
    LoginChecked {
        /// Whether the credentials were accepted.
        ok: bool,
        /// Whether the account exists but is disabled.
        locked: bool,
    },
    /// The gatekeeper fired.
    GateTimeout,
    /// The read side completed with `0` bytes or an error.
    PeerClosed,
    /// Bytes arrived from the peer (counter update).
    BytesRead(u64),
    /// Bytes were written to the peer (counter update).
    BytesWritten(u64),
    /// Cluster reply: target registration finished.
    TargetRegistered {
        /// Echo of the request sequence.
        seq: u8,
        /// Outcome.
        ok: bool,
        /// Allocated channel id.
        channel: u32,
    },
    /// Cluster reply: target deregistration finished.
    TargetDeregistered {
        /// Echo of the request sequence.
        seq: u8,
        /// Outcome.
        ok: bool,
        /// Echoed target name.
        name: String,
    },
    /// Cluster reply: push channel opened.
    ChannelOpened {
        /// Echo of the request sequence.
        seq: u8,
        /// Outcome.
        ok: bool,
        /// Allocated channel id.
        channel: u32,
        /// Allocated source id.
        source: u32,
        /// Negotiated packet size.
        packet_size: u16,
        /// Negotiated window size.
        window_size: u8,
        /// Target sessions behind the channel.
        count: u32,
    },
    /// Cluster reply: push channel closed.
    ChannelClosed {
        /// Echo of the request sequence.
        seq: u8,
        /// Outcome.
        ok: bool,
        /// Echoed channel id.
        channel: u32,
    },
    /// Cluster reply: push data delivered.
    PushDataForwarded {
        /// Echo of the request sequence.
        seq: u8,
        /// Outcome.
        ok: bool,
        /// Echoed channel id.
        channel: u32,
        /// Echoed source id.
        source: u32,
        /// Echoed status byte.
        status: u8,
        /// Echoed block counter.
        block: u8,
    },
    /// Cluster reply: the peer answered our forwarded open-connection.
    ConnectionOpened {
        /// Echo of the request sequence.
        seq: u8,
        /// Outcome.
        ok: bool,
    },
    /// Cluster request: open a connection towards this session's device.
    OpenConnectionRequest {
        /// Called address.
        address: String,
    },
    /// Cluster request: close the point-to-point connection.
    CloseConnectionRequest,
    /// Cluster request: write transparent connection data to the device.
    TransferData {
        /// Payload to forward.
        data: Bytes,
    },
    /// Driver shutdown; `true` means the whole process exits.
    Stop {
        /// Process-exit flag: no further network I/O may happen.
        shutdown: bool,
    },
}

/// Table updates a session publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publish {
    /// Byte counters changed.
    Counters {
        /// Received bytes.
        rx: u64,
        /// Sent bytes.
        sx: u64,
        /// Pushed bytes.
        px: u64,
    },
    /// The device reported its software version.
    SoftwareVersion(String),
    /// The device reported its identifier.
    DeviceIdentifier(String),
}

/// Requests a session forwards to the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterRequest {
    /// Verify login credentials.
    Login {
        /// Account name.
        name: String,
        /// Password.
        pwd: String,
    },
    /// Announce the session end.
    Logout,
    /// Register a push target owned by this session.
    RegisterTarget {
        /// Target name.
        name: String,
        /// Packet size.
        packet_size: u16,
        /// Window size.
        window_size: u8,
        /// Request sequence for the eventual response.
        seq: u8,
    },
    /// Deregister a push target.
    DeregisterTarget {
        /// Target name.
        name: String,
        /// Request sequence for the eventual response.
        seq: u8,
    },
    /// Open a push channel.
    OpenChannel {
        /// Target name the channel binds to.
        target: String,
        /// Account selector.
        account: String,
        /// MSISDN selector.
        msisdn: String,
        /// Version selector.
        version: String,
        /// Device id selector.
        device_id: String,
        /// Timeout in seconds.
        timeout: u16,
        /// Request sequence for the eventual response.
        seq: u8,
    },
    /// Close a push channel.
    CloseChannel {
        /// Channel id.
        channel: u32,
        /// Request sequence for the eventual response.
        seq: u8,
    },
    /// Forward pushed data into the target's channel.
    PushData {
        /// Channel id.
        channel: u32,
        /// Source id.
        source: u32,
        /// Status byte, `0xC1` bits preserved.
        status: u8,
        /// Block counter.
        block: u8,
        /// Payload.
        data: Bytes,
        /// Request sequence for the eventual response.
        seq: u8,
    },
    /// The device dials another party.
    OpenConnection {
        /// Called address.
        address: String,
        /// Request sequence for the eventual response.
        seq: u8,
    },
    /// Transparent connection data from the device.
    TransferData {
        /// Payload.
        data: Bytes,
    },
    /// Verdict on a cluster-initiated open-connection.
    ConnectionOpenResult {
        /// Whether the device accepted.
        ok: bool,
    },
    /// The point-to-point connection ended.
    ConnectionClosed,
}

/// Effects the driver executes on behalf of the state machine.
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Switch the receive scrambler.
    SetRecvKey(ScrambleKey),
    /// Switch the send scrambler; takes effect before the next frame.
    SetSendKey(ScrambleKey),
    /// Write a frame with an explicit sequence number.
    SendFrame {
        /// Command code.
        command: Command,
        /// Sequence number.
        sequence: u8,
        /// Frame body.
        body: Bytes,
    },
    /// Publish a table update.
    Publish(Publish),
    /// Forward a request to the cluster.
    Cluster(ClusterRequest),
    /// Start the login gatekeeper.
    StartGate,
    /// Cancel the login gatekeeper.
    CancelGate,
    /// Tear the session down.
    Close {
        /// Human-readable reason for logs and system messages.
        reason: String,
    },
}

/// Login state while the cluster verdict is outstanding.
#[derive(Debug, Clone)]
struct PendingLogin {
    sequence: u8,
    scrambled: Option<ScrambleKey>,
}

/// Per-connection session state machine.
#[derive(Debug)]
pub struct Session {
    tag: Uuid,
    state: SessionState,
    config: SessionConfig,
    sequence: SequenceGenerator,
    pending_login: Option<PendingLogin>,
    /// Connection-establishment correlation: our request sequence to the
    /// device, while the cluster waits for the verdict.
    oce: HashMap<u8, String>,
    rx: u64,
    sx: u64,
    px: u64,
}

impl Session {
    /// New session for one accepted connection.
    #[must_use]
    pub fn new(tag: Uuid, config: SessionConfig) -> Self {
        Self {
            tag,
            state: SessionState::Connected,
            config,
            sequence: SequenceGenerator::new(),
            pending_login: None,
            oce: HashMap::new(),
            rx: 0,
            sx: 0,
            px: 0,
        }
    }

    /// Session tag.
    #[must_use]
    pub fn tag(&self) -> Uuid {
        self.tag
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Initial actions when the driver starts the session.
    #[must_use]
    pub fn start(&self) -> Vec<SessionAction> {
        vec![SessionAction::StartGate]
    }

    /// Process one event.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }
        match event {
            SessionEvent::Frame { header, body } => self.handle_frame(header, &body),
            SessionEvent::LoginChecked { ok, locked } => self.handle_login_checked(ok, locked),
            SessionEvent::GateTimeout => self.handle_gate_timeout(),
            SessionEvent::PeerClosed => self.close("peer closed the connection"),
            SessionEvent::BytesRead(n) => {
                self.rx += n;
                vec![self.publish_counters()]
            },
            SessionEvent::BytesWritten(n) => {
                self.sx += n;
                vec![self.publish_counters()]
            },
            SessionEvent::TargetRegistered { seq, ok, channel } => {
                let res = RegisterTargetRes { code: if ok { 1 } else { 2 }, channel };
                vec![self.respond(Command::CtrlResRegisterTarget, seq, res.encode())]
            },
            SessionEvent::TargetDeregistered { seq, ok, name } => {
                let res = DeregisterTargetRes { code: if ok { 1 } else { 2 }, target: name };
                vec![self.respond(Command::CtrlResDeregisterTarget, seq, res.encode())]
            },
            SessionEvent::ChannelOpened { seq, ok, channel, source, packet_size, window_size, count } => {
                let res = OpenPushChannelRes {
                    code: if ok { 1 } else { 2 },
                    channel,
                    source,
                    packet_size,
                    window_size,
                    status: 0,
                    count,
                };
                vec![self.respond(Command::TpResOpenPushChannel, seq, res.encode())]
            },
            SessionEvent::ChannelClosed { seq, ok, channel } => {
                let res = ClosePushChannelRes { code: if ok { 1 } else { 3 }, channel };
                vec![self.respond(Command::TpResClosePushChannel, seq, res.encode())]
            },
            SessionEvent::PushDataForwarded { seq, ok, channel, source, status, block } => {
                let res = PushDataTransferRes {
                    code: if ok { 1 } else { 3 },
                    channel,
                    source,
                    // The live bits travel back unchanged
                    status,
                    block,
                };
                vec![self.respond(Command::TpResPushdataTransfer, seq, res.encode())]
            },
            SessionEvent::ConnectionOpened { seq, ok } => {
                let code = if ok { OpenConnectionCode::DialupSuccess } else { OpenConnectionCode::Unreachable };
                vec![self.respond(
                    Command::TpResOpenConnection,
                    seq,
                    CodeRes { code: code as u8 }.encode(),
                )]
            },
            SessionEvent::OpenConnectionRequest { address } => self.handle_open_request(address),
            SessionEvent::CloseConnectionRequest => {
                let seq = self.sequence.assign();
                let mut actions = vec![SessionAction::SendFrame {
                    command: Command::TpReqCloseConnection,
                    sequence: seq,
                    body: Bytes::new(),
                }];
                if self.state == SessionState::Linked {
                    self.state = SessionState::Authorized;
                    actions.push(SessionAction::Cluster(ClusterRequest::ConnectionClosed));
                }
                actions
            },
            SessionEvent::TransferData { data } => {
                if self.state != SessionState::Linked {
                    tracing::warn!(tag = %self.tag, "transfer data outside a connection, dropped");
                    return Vec::new();
                }
                let seq = self.sequence.assign();
                vec![SessionAction::SendFrame {
                    command: Command::TpReqPushdataTransfer,
                    sequence: seq,
                    body: data,
                }]
            },
            SessionEvent::Stop { shutdown } => {
                self.state = SessionState::Closed;
                if shutdown {
                    // Process exit: release without further I/O
                    Vec::new()
                } else {
                    vec![SessionAction::Cluster(ClusterRequest::Logout)]
                }
            },
        }
    }

    fn handle_frame(&mut self, header: Header, body: &[u8]) -> Vec<SessionAction> {
        match header.command {
            Command::CtrlReqLoginPublic => {
                let Ok(req) = LoginPublicReq::decode(body) else {
                    return self.close("malformed public login");
                };
                tracing::info!(tag = %self.tag, name = %req.name, "public login");
                self.pending_login =
                    Some(PendingLogin { sequence: header.sequence, scrambled: None });
                vec![SessionAction::Cluster(ClusterRequest::Login { name: req.name, pwd: req.pwd })]
            },
            Command::CtrlReqLoginScrambled => {
                let Ok(req) = LoginScrambledReq::decode(body) else {
                    return self.close("malformed scrambled login");
                };
                tracing::info!(tag = %self.tag, name = %req.name, "scrambled login");
                self.pending_login =
                    Some(PendingLogin { sequence: header.sequence, scrambled: Some(req.sk) });
                vec![
                    // The client already writes under the new key
                    SessionAction::SetRecvKey(req.sk),
                    SessionAction::Cluster(ClusterRequest::Login { name: req.name, pwd: req.pwd }),
                ]
            },
            Command::CtrlReqWatchdog => {
                vec![self.respond(Command::CtrlResWatchdog, header.sequence, Bytes::new())]
            },
            Command::CtrlReqLogout => {
                let mut actions =
                    vec![self.respond(Command::CtrlResLogout, header.sequence, CodeRes { code: 1 }.encode())];
                actions.extend(self.close("logout"));
                actions
            },
            Command::CtrlReqRegisterTarget => self.authorized(header, body, |s, h, b| {
                let Ok(req) = RegisterTargetReq::decode(b) else {
                    return s.close("malformed register target");
                };
                tracing::info!(tag = %s.tag, target = %req.target, "register target");
                vec![SessionAction::Cluster(ClusterRequest::RegisterTarget {
                    name: req.target,
                    packet_size: req.packet_size,
                    window_size: req.window_size,
                    seq: h.sequence,
                })]
            }),
            Command::CtrlReqDeregisterTarget => self.authorized(header, body, |s, h, b| {
                let Ok(req) = DeregisterTargetReq::decode(b) else {
                    return s.close("malformed deregister target");
                };
                vec![SessionAction::Cluster(ClusterRequest::DeregisterTarget {
                    name: req.target,
                    seq: h.sequence,
                })]
            }),
            Command::TpReqOpenPushChannel => self.authorized(header, body, |s, h, b| {
                let Ok(req) = OpenPushChannelReq::decode(b) else {
                    return s.close("malformed open push channel");
                };
                tracing::info!(tag = %s.tag, target = %req.target, "open push channel");
                vec![SessionAction::Cluster(ClusterRequest::OpenChannel {
                    target: req.target,
                    account: req.account,
                    msisdn: req.msisdn,
                    version: req.version,
                    device_id: req.device_id,
                    timeout: req.timeout,
                    seq: h.sequence,
                })]
            }),
            Command::TpReqClosePushChannel => self.authorized(header, body, |s, h, b| {
                let Ok(req) = ClosePushChannelReq::decode(b) else {
                    return s.close("malformed close push channel");
                };
                vec![SessionAction::Cluster(ClusterRequest::CloseChannel {
                    channel: req.channel,
                    seq: h.sequence,
                })]
            }),
            Command::TpReqPushdataTransfer => self.authorized(header, body, |s, h, b| {
                let Ok(req) = PushDataTransferReq::decode(b) else {
                    return s.close("malformed push data transfer");
                };
                s.px += req.data.len() as u64;
                vec![
                    SessionAction::Cluster(ClusterRequest::PushData {
                        channel: req.channel,
                        source: req.source,
                        status: req.status,
                        block: req.block,
                        data: req.data,
                        seq: h.sequence,
                    }),
                    s.publish_counters(),
                ]
            }),
            Command::TpReqOpenConnection => self.authorized(header, body, |s, h, b| {
                let Ok(req) = OpenConnectionReq::decode(b) else {
                    return s.close("malformed open connection");
                };
                tracing::info!(tag = %s.tag, address = %req.address, "open connection");
                vec![SessionAction::Cluster(ClusterRequest::OpenConnection {
                    address: req.address,
                    seq: h.sequence,
                })]
            }),
            Command::TpReqCloseConnection => {
                let mut actions = vec![self.respond(
                    Command::TpResCloseConnection,
                    header.sequence,
                    CodeRes { code: 1 }.encode(),
                )];
                if self.state == SessionState::Linked {
                    self.state = SessionState::Authorized;
                    actions.push(SessionAction::Cluster(ClusterRequest::ConnectionClosed));
                }
                actions
            },
            Command::TpResOpenConnection => {
                // Verdict for a cluster-initiated connection
                let Some(_address) = self.oce.remove(&header.sequence) else {
                    tracing::warn!(tag = %self.tag, seq = header.sequence, "open connection response without request");
                    return Vec::new();
                };
                let ok = CodeRes::decode(body)
                    .map(|res| OpenConnectionCode::from_u8(res.code).is_success())
                    .unwrap_or(false);
                if ok {
                    self.state = SessionState::Linked;
                }
                vec![SessionAction::Cluster(ClusterRequest::ConnectionOpenResult { ok })]
            },
            Command::TpResCloseConnection | Command::TpResPushdataTransfer | Command::CtrlResWatchdog => {
                // Acknowledgements we do not track individually
                Vec::new()
            },
            Command::AppResSoftwareVersion => match StringRes::decode(body) {
                Ok(res) => vec![SessionAction::Publish(Publish::SoftwareVersion(res.value))],
                Err(_) => Vec::new(),
            },
            Command::AppResDeviceIdentifier => match StringRes::decode(body) {
                Ok(res) => vec![SessionAction::Publish(Publish::DeviceIdentifier(res.value))],
                Err(_) => Vec::new(),
            },
            Command::Unknown => {
                tracing::warn!(tag = %self.tag, raw = header.raw_command, "unknown command");
                let res = UnknownCommandRes { command: header.raw_command };
                let seq = self.sequence.assign();
                vec![SessionAction::SendFrame {
                    command: Command::Unknown,
                    sequence: seq,
                    body: res.encode(),
                }]
            },
            other => {
                tracing::warn!(tag = %self.tag, command = other.name(), "command dropped");
                Vec::new()
            },
        }
    }

    /// Run `f` only in `Authorized` or `Linked`; anything earlier closes
    /// the session.
    fn authorized(
        &mut self,
        header: Header,
        body: &[u8],
        f: impl FnOnce(&mut Self, Header, &[u8]) -> Vec<SessionAction>,
    ) -> Vec<SessionAction> {
        match self.state {
            SessionState::Authorized | SessionState::Linked => f(self, header, body),
            _ => self.close("command before login"),
        }
    }

    fn handle_login_checked(&mut self, ok: bool, locked: bool) -> Vec<SessionAction> {
        let Some(pending) = self.pending_login.take() else {
            tracing::warn!(tag = %self.tag, "login verdict without pending login");
            return Vec::new();
        };
        let command = if pending.scrambled.is_some() {
            Command::CtrlResLoginScrambled
        } else {
            Command::CtrlResLoginPublic
        };
        let code = if locked {
            LoginCode::AccountLocked
        } else if ok {
            LoginCode::Success
        } else {
            LoginCode::UnknownAccount
        };
        let res = LoginRes {
            code: code as u8,
            watchdog: self.config.watchdog_minutes,
            redirect: String::new(),
        };

        let mut actions = Vec::new();
        if code.is_success() {
            self.state = SessionState::Authorized;
            actions.push(SessionAction::CancelGate);
        }
        if let Some(sk) = pending.scrambled {
            // The response is the first frame under the new key
            actions.push(SessionAction::SetSendKey(sk));
        }
        actions.push(SessionAction::SendFrame {
            command,
            sequence: pending.sequence,
            body: res.encode(),
        });
        if code.is_success() && !code.is_locked() {
            // Learn what is on the other side
            let seq = self.sequence.assign();
            actions.push(SessionAction::SendFrame {
                command: Command::AppReqSoftwareVersion,
                sequence: seq,
                body: Bytes::new(),
            });
            let seq = self.sequence.assign();
            actions.push(SessionAction::SendFrame {
                command: Command::AppReqDeviceIdentifier,
                sequence: seq,
                body: Bytes::new(),
            });
        }
        actions
    }

    fn handle_gate_timeout(&mut self) -> Vec<SessionAction> {
        if self.state == SessionState::Connected {
            return self.close("gatekeeper timeout");
        }
        Vec::new()
    }

    fn handle_open_request(&mut self, address: String) -> Vec<SessionAction> {
        match self.state {
            SessionState::Authorized => {
                let seq = self.sequence.assign();
                self.oce.insert(seq, address.clone());
                vec![SessionAction::SendFrame {
                    command: Command::TpReqOpenConnection,
                    sequence: seq,
                    body: OpenConnectionReq { address }.encode(),
                }]
            },
            SessionState::Linked if self.config.connection_superseding => {
                // Close the existing connection, then dial the new one
                let close_seq = self.sequence.assign();
                let open_seq = self.sequence.assign();
                self.oce.insert(open_seq, address.clone());
                self.state = SessionState::Authorized;
                vec![
                    SessionAction::SendFrame {
                        command: Command::TpReqCloseConnection,
                        sequence: close_seq,
                        body: Bytes::new(),
                    },
                    SessionAction::Cluster(ClusterRequest::ConnectionClosed),
                    SessionAction::SendFrame {
                        command: Command::TpReqOpenConnection,
                        sequence: open_seq,
                        body: OpenConnectionReq { address }.encode(),
                    },
                ]
            },
            _ => {
                vec![SessionAction::Cluster(ClusterRequest::ConnectionOpenResult { ok: false })]
            },
        }
    }

    fn respond(&self, command: Command, sequence: u8, body: Bytes) -> SessionAction {
        SessionAction::SendFrame { command, sequence, body }
    }

    fn publish_counters(&self) -> SessionAction {
        SessionAction::Publish(Publish::Counters { rx: self.rx, sx: self.sx, px: self.px })
    }

    fn close(&mut self, reason: &str) -> Vec<SessionAction> {
        self.state = SessionState::Closed;
        vec![
            SessionAction::Cluster(ClusterRequest::Logout),
            SessionAction::Close { reason: reason.to_string() },
        ]
    }
}

#[cfg(test)]
mod tests {
    use smgw_proto::ipt::codec::encode_frame;
    use smgw_proto::ipt::FrameReader;

    use super::*;

    fn frame(command: Command, sequence: u8, body: &[u8]) -> SessionEvent {
        let wire = encode_frame(command, sequence, body);
        let mut reader = FrameReader::new();
        reader.push(&wire);
        let (header, body) = reader.next().unwrap().unwrap();
        SessionEvent::Frame { header, body }
    }

    fn login(session: &mut Session) {
        let req = LoginPublicReq { name: "root".into(), pwd: "root".into() };
        session.handle(frame(Command::CtrlReqLoginPublic, 1, &req.encode()));
        session.handle(SessionEvent::LoginChecked { ok: true, locked: false });
    }

    #[test]
    fn public_login_reaches_authorized() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        assert_eq!(session.state(), SessionState::Connected);

        let req = LoginPublicReq { name: "root".into(), pwd: "root".into() };
        let actions = session.handle(frame(Command::CtrlReqLoginPublic, 1, &req.encode()));
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Cluster(ClusterRequest::Login { .. })]
        ));

        let actions = session.handle(SessionEvent::LoginChecked { ok: true, locked: false });
        assert_eq!(session.state(), SessionState::Authorized);

        // Cancel gate, response, then the two device queries
        assert!(matches!(actions[0], SessionAction::CancelGate));
        let SessionAction::SendFrame { command, sequence, body } = &actions[1] else {
            panic!("expected login response");
        };
        assert_eq!(*command, Command::CtrlResLoginPublic);
        assert_eq!(*sequence, 1);
        let res = LoginRes::decode(body).unwrap();
        assert_eq!(LoginCode::from_u8(res.code), LoginCode::Success);
        assert_eq!(actions.len(), 4);
    }

    #[test]
    fn failed_login_keeps_connected_for_the_gatekeeper() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        let req = LoginPublicReq { name: "root".into(), pwd: "wrong".into() };
        session.handle(frame(Command::CtrlReqLoginPublic, 1, &req.encode()));
        let actions = session.handle(SessionEvent::LoginChecked { ok: false, locked: false });

        assert_eq!(session.state(), SessionState::Connected);
        let SessionAction::SendFrame { body, .. } = &actions[0] else {
            panic!("expected login response");
        };
        let res = LoginRes::decode(body).unwrap();
        assert_eq!(LoginCode::from_u8(res.code), LoginCode::UnknownAccount);

        // The gatekeeper fires and tears the session down
        let actions = session.handle(SessionEvent::GateTimeout);
        assert!(actions.iter().any(|a| matches!(a, SessionAction::Close { .. })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn locked_account_logs_in_but_stays_stalled() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        let req = LoginPublicReq { name: "locked".into(), pwd: "pwd".into() };
        session.handle(frame(Command::CtrlReqLoginPublic, 1, &req.encode()));
        let actions = session.handle(SessionEvent::LoginChecked { ok: false, locked: true });

        assert_eq!(session.state(), SessionState::Authorized);
        // No device queries follow for a locked account
        let sends = actions
            .iter()
            .filter(|a| matches!(a, SessionAction::SendFrame { .. }))
            .count();
        assert_eq!(sends, 1);
    }

    #[test]
    fn scrambled_login_switches_keys_in_order() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        let sk = ScrambleKey::new([7u8; 32]);
        let req = LoginScrambledReq { name: "gw".into(), pwd: "gw".into(), sk };

        let actions = session.handle(frame(Command::CtrlReqLoginScrambled, 1, &req.encode()));
        // Receive side switches as soon as the request is in
        assert!(matches!(actions[0], SessionAction::SetRecvKey(key) if key == sk));

        let actions = session.handle(SessionEvent::LoginChecked { ok: true, locked: false });
        // Send side switches before the response frame goes out
        let set_at = actions
            .iter()
            .position(|a| matches!(a, SessionAction::SetSendKey(key) if *key == sk))
            .unwrap();
        let send_at = actions
            .iter()
            .position(|a| {
                matches!(a, SessionAction::SendFrame { command, .. } if *command == Command::CtrlResLoginScrambled)
            })
            .unwrap();
        assert!(set_at < send_at);
    }

    #[test]
    fn commands_before_login_close_the_session() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        let req = RegisterTargetReq { target: "t".into(), packet_size: 512, window_size: 1 };
        let actions = session.handle(frame(Command::CtrlReqRegisterTarget, 1, &req.encode()));
        assert!(actions.iter().any(|a| matches!(a, SessionAction::Close { .. })));
    }

    #[test]
    fn push_channel_lifecycle() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        login(&mut session);

        // Register target
        let req = RegisterTargetReq { target: "power@solostec".into(), packet_size: 512, window_size: 1 };
        let actions = session.handle(frame(Command::CtrlReqRegisterTarget, 2, &req.encode()));
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Cluster(ClusterRequest::RegisterTarget { seq: 2, .. })]
        ));
        let actions = session.handle(SessionEvent::TargetRegistered { seq: 2, ok: true, channel: 1 });
        let SessionAction::SendFrame { command, sequence, body } = &actions[0] else {
            panic!("expected register response");
        };
        assert_eq!(*command, Command::CtrlResRegisterTarget);
        assert_eq!(*sequence, 2);
        assert_eq!(RegisterTargetRes::decode(body).unwrap().code, 1);

        // Push data keeps the live bits and counts px
        let push = PushDataTransferReq {
            channel: 1,
            source: 9,
            status: 0xC1,
            block: 0,
            data: Bytes::from(vec![0u8; 300]),
        };
        let actions = session.handle(frame(Command::TpReqPushdataTransfer, 3, &push.encode()));
        let SessionAction::Cluster(ClusterRequest::PushData { status, data, .. }) = &actions[0]
        else {
            panic!("expected push data request");
        };
        assert_eq!(status & 0xC1, 0xC1);
        assert_eq!(data.len(), 300);
        assert!(matches!(
            actions[1],
            SessionAction::Publish(Publish::Counters { px: 300, .. })
        ));

        let actions = session.handle(SessionEvent::PushDataForwarded {
            seq: 3,
            ok: true,
            channel: 1,
            source: 9,
            status: 0xC1,
            block: 0,
        });
        let SessionAction::SendFrame { body, .. } = &actions[0] else {
            panic!("expected transfer response");
        };
        assert_eq!(PushDataTransferRes::decode(body).unwrap().status, 0xC1);
    }

    #[test]
    fn cluster_initiated_connection_links_the_session() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        login(&mut session);

        let actions = session.handle(SessionEvent::OpenConnectionRequest { address: "meter-7".into() });
        let SessionAction::SendFrame { command, sequence, .. } = &actions[0] else {
            panic!("expected open connection request to the device");
        };
        assert_eq!(*command, Command::TpReqOpenConnection);

        // Device accepts
        let actions = session.handle(frame(
            Command::TpResOpenConnection,
            *sequence,
            &CodeRes { code: 1 }.encode(),
        ));
        assert_eq!(session.state(), SessionState::Linked);
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Cluster(ClusterRequest::ConnectionOpenResult { ok: true })]
        ));
    }

    #[test]
    fn unmatched_connection_response_is_dropped() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        login(&mut session);
        let actions =
            session.handle(frame(Command::TpResOpenConnection, 0x55, &CodeRes { code: 1 }.encode()));
        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::Authorized);
    }

    #[test]
    fn superseding_closes_then_reopens() {
        let config = SessionConfig { connection_superseding: true, ..SessionConfig::default() };
        let mut session = Session::new(Uuid::new_v4(), config);
        login(&mut session);

        // Establish a first connection
        let actions = session.handle(SessionEvent::OpenConnectionRequest { address: "a".into() });
        let SessionAction::SendFrame { sequence, .. } = &actions[0] else {
            panic!("expected dial");
        };
        session.handle(frame(Command::TpResOpenConnection, *sequence, &CodeRes { code: 1 }.encode()));
        assert_eq!(session.state(), SessionState::Linked);

        // The second request supersedes
        let actions = session.handle(SessionEvent::OpenConnectionRequest { address: "b".into() });
        assert!(matches!(
            actions[0],
            SessionAction::SendFrame { command: Command::TpReqCloseConnection, .. }
        ));
        assert!(matches!(
            actions[2],
            SessionAction::SendFrame { command: Command::TpReqOpenConnection, .. }
        ));
    }

    #[test]
    fn non_superseding_refuses_a_second_connection() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        login(&mut session);
        let actions = session.handle(SessionEvent::OpenConnectionRequest { address: "a".into() });
        let SessionAction::SendFrame { sequence, .. } = &actions[0] else {
            panic!("expected dial");
        };
        session.handle(frame(Command::TpResOpenConnection, *sequence, &CodeRes { code: 1 }.encode()));

        let actions = session.handle(SessionEvent::OpenConnectionRequest { address: "b".into() });
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Cluster(ClusterRequest::ConnectionOpenResult { ok: false })]
        ));
    }

    #[test]
    fn shutdown_stop_produces_no_io() {
        let mut session = Session::new(Uuid::new_v4(), SessionConfig::default());
        login(&mut session);
        let actions = session.handle(SessionEvent::Stop { shutdown: true });
        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
