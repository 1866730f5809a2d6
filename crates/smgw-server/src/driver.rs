//! Session driver.
//!
//! Owns one [`Session`] state machine, one scrambled reader and one
//! scrambled writer per connection, plus the shared cluster node with
//! its table store. The transport feeds raw bytes and lifecycle events
//! in; the driver executes every state-machine action and returns the
//! I/O effects ([`Output`]) for the transport to perform.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use smgw_cluster::ClusterNode;
use smgw_core::cache::{CacheValue, Key};
use smgw_core::session::{
    ClusterRequest, Publish, Session, SessionAction, SessionConfig, SessionEvent,
};
use smgw_crypto::ScrambleKey;
use smgw_proto::ipt::payload::PushDataTransferReq;
use smgw_proto::ipt::{Command, ScrambledReader, ScrambledWriter};
use uuid::Uuid;

/// I/O effects for the transport layer.
#[derive(Debug)]
pub enum Output {
    /// Queue these bytes on the session's write FIFO.
    Write {
        /// Session tag.
        session: Uuid,
        /// Wire bytes, already scrambled.
        bytes: Vec<u8>,
    },
    /// Close the session's socket.
    CloseSession {
        /// Session tag.
        session: Uuid,
        /// Reason for logs.
        reason: String,
    },
    /// Arm the login gatekeeper.
    StartGate {
        /// Session tag.
        session: Uuid,
        /// Grace period.
        timeout: Duration,
    },
    /// Disarm the login gatekeeper.
    CancelGate {
        /// Session tag.
        session: Uuid,
    },
}

/// Per-connection bookkeeping.
struct SessionEntry {
    sm: Session,
    reader: ScrambledReader,
    writer: ScrambledWriter,
    remote: String,
    account: Option<String>,
}

/// A connection establishment the cluster is brokering.
#[derive(Debug, Clone, Copy)]
struct PendingConnect {
    caller: Uuid,
    caller_seq: u8,
}

/// The session driver.
pub struct ServerDriver {
    session_config: SessionConfig,
    /// Gateway accounts accepted at IP-T login.
    accounts: HashMap<String, String>,
    /// Whether every account is accepted (test/lab configurations).
    accept_all: bool,
    node: ClusterNode,
    sessions: HashMap<Uuid, SessionEntry>,
    /// Callee tag → brokered connect.
    pending_connects: HashMap<Uuid, PendingConnect>,
    channel_seq: u32,
}

impl std::fmt::Debug for ServerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver").field("sessions", &self.sessions.len()).finish()
    }
}

impl ServerDriver {
    /// New driver.
    #[must_use]
    pub fn new(
        session_config: SessionConfig,
        accounts: HashMap<String, String>,
        accept_all: bool,
        node: ClusterNode,
    ) -> Self {
        Self {
            session_config,
            accounts,
            accept_all,
            node,
            sessions: HashMap::new(),
            pending_connects: HashMap::new(),
            channel_seq: 0,
        }
    }

    /// Shared access to the cluster node.
    #[must_use]
    pub fn node(&self) -> &ClusterNode {
        &self.node
    }

    /// Write access to the cluster node.
    #[must_use]
    pub fn node_mut(&mut self) -> &mut ClusterNode {
        &mut self.node
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// A connection was accepted.
    pub fn connected(&mut self, tag: Uuid, remote: String, key: ScrambleKey) -> Vec<Output> {
        let sm = Session::new(tag, self.session_config.clone());
        let start = sm.start();
        self.sessions.insert(
            tag,
            SessionEntry {
                sm,
                reader: ScrambledReader::new(key),
                writer: ScrambledWriter::new(key),
                remote,
                account: None,
            },
        );
        tracing::info!(tag = %tag, "session created");
        self.execute(tag, start)
    }

    /// Raw bytes arrived from the peer.
    pub fn received(&mut self, tag: Uuid, bytes: &[u8]) -> Vec<Output> {
        let Some(entry) = self.sessions.get_mut(&tag) else {
            return Vec::new();
        };
        entry.reader.push(bytes);

        let mut events = vec![SessionEvent::BytesRead(bytes.len() as u64)];
        loop {
            match entry.reader.next() {
                Some(Ok((header, body))) => events.push(SessionEvent::Frame { header, body }),
                Some(Err(err)) => {
                    tracing::warn!(tag = %tag, "frame error: {err}");
                    events.push(SessionEvent::PeerClosed);
                    break;
                },
                None => break,
            }
        }

        let mut outputs = Vec::new();
        for event in events {
            outputs.extend(self.dispatch(tag, event));
        }
        outputs
    }

    /// A write of `n` bytes completed.
    pub fn written(&mut self, tag: Uuid, n: u64) -> Vec<Output> {
        self.dispatch(tag, SessionEvent::BytesWritten(n))
    }

    /// The gatekeeper fired. No-op if the session is already gone.
    pub fn gate_timeout(&mut self, tag: Uuid) -> Vec<Output> {
        self.dispatch(tag, SessionEvent::GateTimeout)
    }

    /// The socket closed.
    pub fn disconnected(&mut self, tag: Uuid) -> Vec<Output> {
        let outputs = self.dispatch(tag, SessionEvent::PeerClosed);
        self.drop_session(tag);
        outputs
    }

    /// Process-level shutdown: release every session without I/O.
    pub fn shutdown(&mut self) {
        let tags: Vec<Uuid> = self.sessions.keys().copied().collect();
        for tag in tags {
            let _ = self.dispatch(tag, SessionEvent::Stop { shutdown: true });
            self.drop_session(tag);
        }
    }

    /// Feed one event into a session's state machine.
    fn dispatch(&mut self, tag: Uuid, event: SessionEvent) -> Vec<Output> {
        let Some(entry) = self.sessions.get_mut(&tag) else {
            return Vec::new();
        };
        let actions = entry.sm.handle(event);
        self.execute(tag, actions)
    }

    /// Execute state-machine actions.
    fn execute(&mut self, tag: Uuid, actions: Vec<SessionAction>) -> Vec<Output> {
        let mut outputs = Vec::new();
        for action in actions {
            match action {
                SessionAction::SetRecvKey(key) => {
                    if let Some(entry) = self.sessions.get_mut(&tag) {
                        entry.reader.set_key(key);
                    }
                },
                SessionAction::SetSendKey(key) => {
                    if let Some(entry) = self.sessions.get_mut(&tag) {
                        entry.writer.set_key(key);
                    }
                },
                SessionAction::SendFrame { command, sequence, body } => {
                    if let Some(entry) = self.sessions.get_mut(&tag) {
                        let wire = entry.writer.response(command, sequence, &body);
                        outputs.push(Output::Write { session: tag, bytes: wire });
                    }
                },
                SessionAction::Publish(publish) => self.publish(tag, publish),
                SessionAction::Cluster(request) => {
                    outputs.extend(self.handle_cluster(tag, request));
                },
                SessionAction::StartGate => outputs.push(Output::StartGate {
                    session: tag,
                    timeout: self.session_config.gatekeeper_timeout,
                }),
                SessionAction::CancelGate => outputs.push(Output::CancelGate { session: tag }),
                SessionAction::Close { reason } => {
                    outputs.push(Output::CloseSession { session: tag, reason });
                },
            }
        }
        outputs
    }

    /// Publish a session update into the table store.
    fn publish(&mut self, tag: Uuid, publish: Publish) {
        let store = self.node.store_mut();
        match publish {
            Publish::Counters { rx, sx, px } => {
                if let Some(table) = store.table_mut("session") {
                    let key = Key::tag(tag);
                    table.modify(&key, "rx", CacheValue::U64(rx), tag);
                    table.modify(&key, "sx", CacheValue::U64(sx), tag);
                    table.modify(&key, "px", CacheValue::U64(px), tag);
                }
            },
            Publish::SoftwareVersion(version) => {
                if let Some(table) = store.table_mut("device") {
                    table.modify(&Key::tag(tag), "vFirmware", CacheValue::Str(version), tag);
                }
            },
            Publish::DeviceIdentifier(id) => {
                if let Some(table) = store.table_mut("device") {
                    table.modify(&Key::tag(tag), "id", CacheValue::Str(id), tag);
                }
            },
        }
    }

    /// Serve a cluster request locally.
    fn handle_cluster(&mut self, tag: Uuid, request: ClusterRequest) -> Vec<Output> {
        match request {
            ClusterRequest::Login { name, pwd } => {
                let ok = self.accept_all
                    || self.accounts.get(&name).is_some_and(|expected| *expected == pwd);
                if ok {
                    let remote = self
                        .sessions
                        .get(&tag)
                        .map(|e| e.remote.clone())
                        .unwrap_or_default();
                    if let Some(entry) = self.sessions.get_mut(&tag) {
                        entry.account = Some(name.clone());
                    }
                    if let Some(table) = self.node.store_mut().table_mut("session") {
                        table.insert(
                            Key::tag(tag),
                            vec![
                                CacheValue::Str(remote),
                                CacheValue::Str(name),
                                CacheValue::Tag(Uuid::nil()),
                                CacheValue::U64(0),
                                CacheValue::U64(0),
                                CacheValue::U64(0),
                            ],
                            1,
                            tag,
                        );
                    }
                    if let Some(table) = self.node.store_mut().table_mut("device") {
                        table.insert(
                            Key::tag(tag),
                            vec![
                                CacheValue::Str(String::new()),
                                CacheValue::Str(String::new()),
                                CacheValue::Str(String::new()),
                                CacheValue::Bool(true),
                            ],
                            1,
                            tag,
                        );
                    }
                } else {
                    tracing::warn!(tag = %tag, "login refused");
                }
                self.dispatch(tag, SessionEvent::LoginChecked { ok, locked: false })
            },
            ClusterRequest::Logout => {
                self.drop_session_rows(tag);
                Vec::new()
            },
            ClusterRequest::RegisterTarget { name, packet_size, window_size, seq } => {
                let ok = !name.is_empty()
                    && self.node.store_mut().table_mut("target").is_some_and(|table| {
                        table.insert(
                            Key::str(name.clone()),
                            vec![
                                CacheValue::Tag(tag),
                                CacheValue::Tag(Uuid::nil()),
                                CacheValue::U16(packet_size),
                                CacheValue::U8(window_size),
                            ],
                            1,
                            tag,
                        )
                    });
                self.channel_seq += 1;
                let channel = self.channel_seq;
                self.dispatch(tag, SessionEvent::TargetRegistered { seq, ok, channel })
            },
            ClusterRequest::DeregisterTarget { name, seq } => {
                let ok = self
                    .node
                    .store_mut()
                    .table_mut("target")
                    .is_some_and(|table| table.erase(&Key::str(name.clone()), tag));
                self.dispatch(tag, SessionEvent::TargetDeregistered { seq, ok, name })
            },
            ClusterRequest::OpenChannel { target, seq, .. } => {
                let owner = self.target_owner(&target);
                match owner {
                    Some((_, packet_size, window_size)) => {
                        self.channel_seq += 1;
                        let channel = self.channel_seq;
                        self.channel_seq += 1;
                        let source = self.channel_seq;
                        if let Some(table) = self.node.store_mut().table_mut("channel") {
                            table.insert(
                                Key::u32(channel),
                                vec![
                                    CacheValue::U32(source),
                                    CacheValue::Str(target.clone()),
                                    CacheValue::Tag(tag),
                                    CacheValue::Tag(Uuid::nil()),
                                ],
                                1,
                                tag,
                            );
                        }
                        self.dispatch(
                            tag,
                            SessionEvent::ChannelOpened {
                                seq,
                                ok: true,
                                channel,
                                source,
                                packet_size,
                                window_size,
                                count: 1,
                            },
                        )
                    },
                    None => self.dispatch(
                        tag,
                        SessionEvent::ChannelOpened {
                            seq,
                            ok: false,
                            channel: 0,
                            source: 0,
                            packet_size: 0,
                            window_size: 1,
                            count: 0,
                        },
                    ),
                }
            },
            ClusterRequest::CloseChannel { channel, seq } => {
                let ok = self
                    .node
                    .store_mut()
                    .table_mut("channel")
                    .is_some_and(|table| table.erase(&Key::u32(channel), tag));
                self.dispatch(tag, SessionEvent::ChannelClosed { seq, ok, channel })
            },
            ClusterRequest::PushData { channel, source, status, block, data, seq } => {
                let delivered = self.deliver_push(channel, source, status, block, &data);
                let mut outputs = delivered.1;
                outputs.extend(self.dispatch(
                    tag,
                    SessionEvent::PushDataForwarded {
                        seq,
                        ok: delivered.0,
                        channel,
                        source,
                        status,
                        block,
                    },
                ));
                outputs
            },
            ClusterRequest::OpenConnection { address, seq } => {
                let callee = self.session_by_account(&address, tag);
                match callee {
                    Some(callee) => {
                        self.pending_connects
                            .insert(callee, PendingConnect { caller: tag, caller_seq: seq });
                        self.dispatch(callee, SessionEvent::OpenConnectionRequest { address })
                    },
                    None => self.dispatch(tag, SessionEvent::ConnectionOpened { seq, ok: false }),
                }
            },
            ClusterRequest::ConnectionOpenResult { ok } => {
                let Some(pending) = self.pending_connects.remove(&tag) else {
                    tracing::warn!(tag = %tag, "connect verdict without pending connect");
                    return Vec::new();
                };
                if ok {
                    if let Some(table) = self.node.store_mut().table_mut("connection") {
                        table.insert(
                            Key::tag(pending.caller),
                            vec![CacheValue::Tag(tag), CacheValue::Ts(Utc::now())],
                            1,
                            tag,
                        );
                    }
                }
                self.dispatch(
                    pending.caller,
                    SessionEvent::ConnectionOpened { seq: pending.caller_seq, ok },
                )
            },
            ClusterRequest::ConnectionClosed => {
                if let Some(peer) = self.connection_peer(tag) {
                    self.remove_connection(tag);
                    return self.dispatch(peer, SessionEvent::CloseConnectionRequest);
                }
                Vec::new()
            },
            ClusterRequest::TransferData { data } => {
                match self.connection_peer(tag) {
                    Some(peer) => self.dispatch(peer, SessionEvent::TransferData { data }),
                    None => {
                        tracing::warn!(tag = %tag, "transfer data without connection");
                        Vec::new()
                    },
                }
            },
        }
    }

    /// Target row lookup: owner session, packet size, window size.
    fn target_owner(&self, name: &str) -> Option<(Uuid, u16, u8)> {
        let table = self.node.store().table("target")?;
        let schema = table.schema().clone();
        let record = table.lookup(&Key::str(name))?;
        let owner = record.get(&schema, "session").and_then(CacheValue::as_tag)?;
        let packet_size = record.get(&schema, "packetSize").and_then(CacheValue::as_u64)? as u16;
        let window_size = record.get(&schema, "windowSize").and_then(CacheValue::as_u64)? as u8;
        Some((owner, packet_size, window_size))
    }

    /// Deliver pushed data to the session owning the channel's target.
    fn deliver_push(
        &mut self,
        channel: u32,
        source: u32,
        status: u8,
        block: u8,
        data: &Bytes,
    ) -> (bool, Vec<Output>) {
        let target = self.node.store().table("channel").and_then(|table| {
            let schema = table.schema().clone();
            table
                .lookup(&Key::u32(channel))
                .and_then(|record| record.get(&schema, "target").and_then(CacheValue::as_str).map(str::to_string))
        });
        let Some(target) = target else {
            return (false, Vec::new());
        };
        let Some((owner, _, _)) = self.target_owner(&target) else {
            return (false, Vec::new());
        };
        let Some(entry) = self.sessions.get_mut(&owner) else {
            return (false, Vec::new());
        };

        let req = PushDataTransferReq {
            channel,
            source,
            status,
            block,
            data: data.clone(),
        };
        let (_, wire) = entry.writer.request(Command::TpReqPushdataTransfer, &req.encode());
        (true, vec![Output::Write { session: owner, bytes: wire }])
    }

    /// Session whose account equals the called address, excluding self.
    fn session_by_account(&self, address: &str, exclude: Uuid) -> Option<Uuid> {
        self.sessions
            .iter()
            .find(|(tag, entry)| {
                **tag != exclude && entry.account.as_deref() == Some(address)
            })
            .map(|(tag, _)| *tag)
    }

    /// Other end of this session's point-to-point connection.
    fn connection_peer(&self, tag: Uuid) -> Option<Uuid> {
        let table = self.node.store().table("connection")?;
        let schema = table.schema().clone();
        if let Some(record) = table.lookup(&Key::tag(tag)) {
            return record.get(&schema, "callee").and_then(CacheValue::as_tag);
        }
        let rows = table.select(|record| {
            record.get(&schema, "callee").and_then(CacheValue::as_tag) == Some(tag)
        });
        rows.first().and_then(|record| record.key.0.first().and_then(CacheValue::as_tag))
    }

    fn remove_connection(&mut self, tag: Uuid) {
        let Some(table) = self.node.store_mut().table_mut("connection") else {
            return;
        };
        let schema = table.schema().clone();
        if !table.erase(&Key::tag(tag), tag) {
            let doomed: Vec<Key> = table
                .select(|record| {
                    record.get(&schema, "callee").and_then(CacheValue::as_tag) == Some(tag)
                })
                .into_iter()
                .map(|record| record.key)
                .collect();
            for key in doomed {
                table.erase(&key, tag);
            }
        }
    }

    /// Remove a session's table rows.
    fn drop_session_rows(&mut self, tag: Uuid) {
        self.remove_connection(tag);
        let store = self.node.store_mut();
        if let Some(table) = store.table_mut("session") {
            table.erase(&Key::tag(tag), tag);
        }
        if let Some(table) = store.table_mut("device") {
            table.erase(&Key::tag(tag), tag);
        }
        if let Some(table) = store.table_mut("target") {
            let schema = table.schema().clone();
            let doomed: Vec<Key> = table
                .select(|record| {
                    record.get(&schema, "session").and_then(CacheValue::as_tag) == Some(tag)
                })
                .into_iter()
                .map(|record| record.key)
                .collect();
            for key in doomed {
                table.erase(&key, tag);
            }
        }
        if let Some(table) = store.table_mut("channel") {
            let schema = table.schema().clone();
            let doomed: Vec<Key> = table
                .select(|record| {
                    record.get(&schema, "owner").and_then(CacheValue::as_tag) == Some(tag)
                })
                .into_iter()
                .map(|record| record.key)
                .collect();
            for key in doomed {
                table.erase(&key, tag);
            }
        }
        self.pending_connects.remove(&tag);
    }

    fn drop_session(&mut self, tag: Uuid) {
        self.sessions.remove(&tag);
        self.node.store_mut().unsubscribe_owner(tag);
    }
}

#[cfg(test)]
mod tests {
    use smgw_proto::ipt::payload::{
        LoginPublicReq, LoginRes, OpenPushChannelReq, OpenPushChannelRes, PushDataTransferRes,
        RegisterTargetReq,
    };
    use smgw_proto::ipt::response::{LoginCode, PushChannelCode, PushDataCode, TargetCode};
    use smgw_proto::ipt::{FrameReader, codec::encode_frame};

    use super::*;

    fn driver() -> ServerDriver {
        let accounts = HashMap::from([("root".to_string(), "root".to_string())]);
        ServerDriver::new(
            SessionConfig::default(),
            accounts,
            false,
            ClusterNode::new(HashMap::new()),
        )
    }

    /// Decode all frames of the outputs written to `session`.
    fn written_frames(outputs: &[Output], session: Uuid) -> Vec<(Command, u8, Bytes)> {
        let mut reader = FrameReader::new();
        for output in outputs {
            if let Output::Write { session: s, bytes } = output {
                if *s == session {
                    reader.push(bytes);
                }
            }
        }
        std::iter::from_fn(|| reader.next())
            .map(|r| r.unwrap())
            .map(|(h, b)| (h.command, h.sequence, b))
            .collect()
    }

    fn connect(driver: &mut ServerDriver) -> Uuid {
        let tag = Uuid::new_v4();
        let outputs = driver.connected(tag, "10.0.0.2:4099".into(), ScrambleKey::NULL);
        assert!(matches!(outputs.as_slice(), [Output::StartGate { .. }]));
        tag
    }

    fn login(driver: &mut ServerDriver, tag: Uuid) {
        let req = LoginPublicReq { name: "root".into(), pwd: "root".into() };
        let wire = encode_frame(Command::CtrlReqLoginPublic, 1, &req.encode());
        let outputs = driver.received(tag, &wire);
        let frames = written_frames(&outputs, tag);
        assert_eq!(frames[0].0, Command::CtrlResLoginPublic);
        let res = LoginRes::decode(&frames[0].2).unwrap();
        assert!(LoginCode::from_u8(res.code).is_success());
    }

    #[test]
    fn public_login_end_to_end() {
        let mut driver = driver();
        let tag = connect(&mut driver);
        login(&mut driver, tag);

        // The session row exists with the account
        let store = driver.node().store();
        let table = store.table("session").unwrap();
        let schema = table.schema().clone();
        let record = table.lookup(&Key::tag(tag)).unwrap();
        assert_eq!(
            record.get(&schema, "account").and_then(CacheValue::as_str),
            Some("root")
        );
    }

    #[test]
    fn wrong_password_is_refused() {
        let mut driver = driver();
        let tag = connect(&mut driver);
        let req = LoginPublicReq { name: "root".into(), pwd: "nope".into() };
        let wire = encode_frame(Command::CtrlReqLoginPublic, 1, &req.encode());
        let outputs = driver.received(tag, &wire);
        let frames = written_frames(&outputs, tag);
        let res = LoginRes::decode(&frames[0].2).unwrap();
        assert!(!LoginCode::from_u8(res.code).is_success());
    }

    #[test]
    fn push_channel_lifecycle_over_two_sessions() {
        let mut driver = driver();

        // The target owner
        let owner = connect(&mut driver);
        login(&mut driver, owner);
        let register = RegisterTargetReq {
            target: "power@solostec".into(),
            packet_size: 512,
            window_size: 1,
        };
        let wire = encode_frame(Command::CtrlReqRegisterTarget, 2, &register.encode());
        let outputs = driver.received(owner, &wire);
        let frames = written_frames(&outputs, owner);
        assert_eq!(frames[0].0, Command::CtrlResRegisterTarget);

        // The pusher opens a channel to the target
        let pusher = connect(&mut driver);
        login(&mut driver, pusher);
        let open = OpenPushChannelReq {
            target: "power@solostec".into(),
            account: String::new(),
            msisdn: String::new(),
            version: String::new(),
            device_id: String::new(),
            timeout: 30,
        };
        let wire = encode_frame(Command::TpReqOpenPushChannel, 2, &open.encode());
        let outputs = driver.received(pusher, &wire);
        let frames = written_frames(&outputs, pusher);
        let res = OpenPushChannelRes::decode(&frames[0].2).unwrap();
        assert!(PushChannelCode::from_u8(res.code).is_success());
        assert_eq!(res.packet_size, 512);

        // 300 bytes of push data reach the owner and are acknowledged
        let push = PushDataTransferReq {
            channel: res.channel,
            source: res.source,
            status: 0xC1,
            block: 0,
            data: Bytes::from(vec![0x42; 300]),
        };
        let wire = encode_frame(Command::TpReqPushdataTransfer, 3, &push.encode());
        let outputs = driver.received(pusher, &wire);

        let to_owner = written_frames(&outputs, owner);
        assert_eq!(to_owner[0].0, Command::TpReqPushdataTransfer);
        let delivered = PushDataTransferReq::decode(&to_owner[0].2).unwrap();
        assert_eq!(delivered.data.len(), 300);
        assert_eq!(delivered.status & 0xC1, 0xC1);

        let to_pusher = written_frames(&outputs, pusher);
        let ack = PushDataTransferRes::decode(&to_pusher[0].2).unwrap();
        assert!(PushDataCode::from_u8(ack.code).is_success());
        assert_eq!(ack.status & 0xC1, 0xC1);

        // Close the channel again
        let close = smgw_proto::ipt::payload::ClosePushChannelReq { channel: res.channel };
        let wire = encode_frame(Command::TpReqClosePushChannel, 4, &close.encode());
        let outputs = driver.received(pusher, &wire);
        let frames = written_frames(&outputs, pusher);
        let closed =
            smgw_proto::ipt::payload::ClosePushChannelRes::decode(&frames[0].2).unwrap();
        assert!(PushChannelCode::from_u8(closed.code).is_success());
        assert_eq!(driver.node().store().table("channel").unwrap().size(), 0);
    }

    #[test]
    fn open_channel_without_target_fails() {
        let mut driver = driver();
        let tag = connect(&mut driver);
        login(&mut driver, tag);

        let open = OpenPushChannelReq {
            target: "nobody".into(),
            account: String::new(),
            msisdn: String::new(),
            version: String::new(),
            device_id: String::new(),
            timeout: 30,
        };
        let wire = encode_frame(Command::TpReqOpenPushChannel, 2, &open.encode());
        let outputs = driver.received(tag, &wire);
        let frames = written_frames(&outputs, tag);
        let res = OpenPushChannelRes::decode(&frames[0].2).unwrap();
        assert!(!PushChannelCode::from_u8(res.code).is_success());
    }

    #[test]
    fn duplicate_target_registration_is_rejected() {
        let mut driver = driver();
        let first = connect(&mut driver);
        login(&mut driver, first);
        let register = RegisterTargetReq { target: "t".into(), packet_size: 128, window_size: 1 };
        let wire = encode_frame(Command::CtrlReqRegisterTarget, 2, &register.encode());
        driver.received(first, &wire);

        let second = connect(&mut driver);
        login(&mut driver, second);
        let wire = encode_frame(Command::CtrlReqRegisterTarget, 2, &register.encode());
        let outputs = driver.received(second, &wire);
        let frames = written_frames(&outputs, second);
        let code = frames[0].2[0];
        assert!(!TargetCode::from_u8(code).is_success());
    }

    #[test]
    fn disconnect_sweeps_the_rows() {
        let mut driver = driver();
        let tag = connect(&mut driver);
        login(&mut driver, tag);
        let register = RegisterTargetReq { target: "t".into(), packet_size: 128, window_size: 1 };
        let wire = encode_frame(Command::CtrlReqRegisterTarget, 2, &register.encode());
        driver.received(tag, &wire);
        assert_eq!(driver.node().store().table("target").unwrap().size(), 1);

        driver.disconnected(tag);
        assert_eq!(driver.session_count(), 0);
        assert_eq!(driver.node().store().table("target").unwrap().size(), 0);
        assert_eq!(driver.node().store().table("session").unwrap().size(), 0);
    }

    #[test]
    fn gate_timeout_after_drop_is_silent() {
        let mut driver = driver();
        let tag = connect(&mut driver);
        driver.disconnected(tag);
        // The gatekeeper observes a session that no longer exists
        assert!(driver.gate_timeout(tag).is_empty());
    }
}
