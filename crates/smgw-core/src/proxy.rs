//! Gateway proxy: per-device SML command queue with transaction
//! correlation.
//!
//! The back office talks to one gateway at a time over its IP-T session.
//! The proxy serialises queued requests into SML envelopes
//! (`open / payload / close`), correlates the asynchronous responses by
//! transaction id and forwards the results to whoever asked.
//!
//! # State machine
//!
//! ```text
//! ┌─────────┐ enqueue  ┌─────────┐ session ready ┌───────────┐
//! │ Offline │─────────>│ Waiting │──────────────>│ Connected │
//! └─────────┘          └─────────┘               └───────────┘
//!      ↑      queue drained ∧ all responses in        │
//!      └───────────────────────────────────────────────┘
//! ```
//!
//! A readiness timeout keeps the queue intact — requests survive until a
//! session shows up. Orphaned correlation entries are cleared whenever
//! the proxy falls back to `Offline`.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use smgw_proto::obis::{Obis, ObisPath};
use smgw_proto::sml::{RequestGenerator, SmlBody, SmlMessage, SmlParser, SmlValue};
use uuid::Uuid;

/// Proxy lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// No session redirect requested.
    Offline,
    /// Redirect requested, waiting for session readiness.
    Waiting,
    /// The gateway session forwards our bytes.
    Connected,
}

/// Kind of SML request a queue entry produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyCommand {
    /// `GetProcParameter.Req` on the root code.
    GetProcParameter,
    /// `SetProcParameter.Req` installing a value at the path leaf.
    SetProcParameter,
    /// `GetProfileList.Req` over a time range.
    GetProfileList,
    /// `GetList.Req` on the root code.
    GetList,
}

/// One queued back-office request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Target session tag (the gateway's IP-T session).
    pub tag_ident: Uuid,
    /// Requesting cluster node tag.
    pub tag_source: Uuid,
    /// Cluster sequence of the originating request.
    pub cluster_seq: u64,
    /// Originating web-session tag.
    pub tag_origin: Uuid,
    /// Request kind.
    pub command: ProxyCommand,
    /// Root OBIS code.
    pub root: Obis,
    /// Gateway table primary key.
    pub gw_key: Vec<String>,
    /// Optional value for set requests.
    pub value: Option<SmlValue>,
    /// Profile query range `(begin, end)`, epoch seconds.
    pub range: Option<(u32, u32)>,
    /// Addressed server id.
    pub server_id: Vec<u8>,
    /// Gateway account name.
    pub name: String,
    /// Gateway account password.
    pub pwd: String,
}

/// A correlated result on its way back to the originator.
#[derive(Debug, Clone)]
pub struct ProxyResult {
    /// The request this result answers.
    pub request: ProxyRequest,
    /// Transaction id that carried the response.
    pub trx: Bytes,
    /// The decoded response body.
    pub body: SmlBody,
}

/// Effects the proxy asks its driver to execute.
#[derive(Debug)]
pub enum ProxyAction {
    /// Ask the session layer for a redirect to the gateway.
    RequestRedirect {
        /// Gateway session tag.
        tag_ident: Uuid,
    },
    /// Write boxed SML bytes through the session.
    Send(Bytes),
    /// Forward a correlated response to the originator via the cluster.
    ForwardResponse(Box<ProxyResult>),
    /// Forward an attention verdict, annotated with its well-known name.
    ForwardAttention {
        /// The request this attention answers.
        request: Box<ProxyRequest>,
        /// Attention code.
        code: Obis,
        /// Registry name of the code, if known.
        name: Option<&'static str>,
        /// Optional message text from the device.
        message: Option<String>,
    },
    /// Terminate the session redirect.
    EndRedirect,
}

/// Per-gateway proxy.
#[derive(Debug)]
pub struct GatewayProxy {
    state: ProxyState,
    queue: VecDeque<ProxyRequest>,
    /// trx → originating request, for every payload message in flight.
    output: HashMap<Bytes, ProxyRequest>,
    /// Envelope bookkeeping trxs (open/close) awaiting their responses.
    envelope: HashMap<Bytes, ()>,
    open_requests: usize,
    generator: RequestGenerator,
    parser: SmlParser,
    client_id: Option<Bytes>,
}

impl GatewayProxy {
    /// New proxy generating requests under the given account.
    #[must_use]
    pub fn new(name: impl Into<String>, pwd: impl Into<String>, client_id: Option<Bytes>) -> Self {
        let name = name.into();
        let pwd = pwd.into();
        Self {
            state: ProxyState::Offline,
            queue: VecDeque::new(),
            output: HashMap::new(),
            envelope: HashMap::new(),
            open_requests: 0,
            generator: RequestGenerator::new(name, pwd),
            parser: SmlParser::new(),
            client_id,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Pending queue length.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Outstanding correlation entries.
    #[must_use]
    pub fn open_requests(&self) -> usize {
        self.open_requests
    }

    /// Enqueue a request; asks for a redirect when the proxy was idle.
    pub fn enqueue(&mut self, request: ProxyRequest) -> Vec<ProxyAction> {
        let tag_ident = request.tag_ident;
        self.queue.push_back(request);
        match self.state {
            ProxyState::Offline => {
                self.state = ProxyState::Waiting;
                vec![ProxyAction::RequestRedirect { tag_ident }]
            },
            _ => Vec::new(),
        }
    }

    /// The session layer granted the redirect.
    pub fn session_ready(&mut self) -> Vec<ProxyAction> {
        if self.state != ProxyState::Waiting {
            tracing::warn!("unexpected session readiness in state {:?}", self.state);
            return Vec::new();
        }
        self.state = ProxyState::Connected;
        self.execute_front()
    }

    /// The session dropped; requests stay queued for the next attempt.
    pub fn session_lost(&mut self) -> Vec<ProxyAction> {
        self.to_offline();
        if self.queue.is_empty() {
            Vec::new()
        } else {
            self.state = ProxyState::Waiting;
            vec![ProxyAction::RequestRedirect {
                tag_ident: self.queue[0].tag_ident,
            }]
        }
    }

    /// Serialise the front request into one SML envelope.
    fn execute_front(&mut self) -> Vec<ProxyAction> {
        let Some(request) = self.queue.front().cloned() else {
            return self.finish_if_drained();
        };

        let open_trx = self.generator.public_open(self.client_id.clone(), Some(Bytes::copy_from_slice(&request.server_id)));
        self.envelope.insert(Bytes::from(open_trx.into_bytes()), ());

        let path = ObisPath::root(request.root);
        let payload_trx = match request.command {
            ProxyCommand::GetProcParameter => {
                self.generator.get_proc_parameter(&request.server_id, &path)
            },
            ProxyCommand::SetProcParameter => self.generator.set_proc_parameter(
                &request.server_id,
                &path,
                request.value.clone().unwrap_or(SmlValue::None),
            ),
            ProxyCommand::GetProfileList => {
                let (begin, end) = request.range.unwrap_or((0, u32::MAX));
                self.generator.get_profile_list(&request.server_id, begin, end, &path)
            },
            ProxyCommand::GetList => {
                self.generator.get_list(self.client_id.clone(), &request.server_id, request.root)
            },
        };
        self.output.insert(Bytes::from(payload_trx.into_bytes()), request);

        let close_trx = self.generator.public_close();
        self.envelope.insert(Bytes::from(close_trx.into_bytes()), ());

        self.open_requests += self.generator.pending();
        let framed = self.generator.boxing();
        vec![ProxyAction::Send(framed)]
    }

    /// Feed response bytes from the gateway session.
    pub fn receive(&mut self, data: &[u8]) -> Vec<ProxyAction> {
        self.parser.push(data);
        let mut actions = Vec::new();
        while let Some(item) = self.parser.next() {
            match item {
                Ok(msg) => actions.extend(self.handle_message(msg)),
                Err(err) => {
                    // The parser already resynchronised at the next escape
                    tracing::warn!("sml response error: {err}");
                },
            }
        }
        actions
    }

    fn handle_message(&mut self, msg: SmlMessage) -> Vec<ProxyAction> {
        let trx = msg.trx.clone();
        match msg.body {
            SmlBody::OpenResponse(_) => {
                self.settle_envelope(&trx);
                Vec::new()
            },
            SmlBody::CloseResponse(_) => {
                self.settle_envelope(&trx);
                let mut actions = Vec::new();
                // Envelope finished: pop the queue and continue or wind down
                self.queue.pop_front();
                if self.queue.is_empty() {
                    actions.extend(self.finish_if_drained());
                } else {
                    actions.extend(self.execute_front());
                }
                actions
            },
            SmlBody::AttentionResponse(att) => {
                self.open_requests = self.open_requests.saturating_sub(1);
                match self.output.remove(&trx) {
                    Some(request) => vec![ProxyAction::ForwardAttention {
                        request: Box::new(request),
                        code: att.code,
                        name: att.code.name(),
                        message: att.message,
                    }],
                    None => {
                        tracing::warn!(trx = ?trx, "attention without matching transaction");
                        Vec::new()
                    },
                }
            },
            body => {
                self.open_requests = self.open_requests.saturating_sub(1);
                match self.output.remove(&trx) {
                    Some(request) => vec![ProxyAction::ForwardResponse(Box::new(ProxyResult {
                        request,
                        trx,
                        body,
                    }))],
                    None => {
                        // The device is trusted to recover on close
                        tracing::warn!(trx = ?trx, kind = body.kind_name(), "response without matching transaction");
                        Vec::new()
                    },
                }
            },
        }
    }

    fn settle_envelope(&mut self, trx: &Bytes) {
        if self.envelope.remove(trx).is_some() {
            self.open_requests = self.open_requests.saturating_sub(1);
        } else {
            tracing::warn!(trx = ?trx, "envelope response without matching transaction");
        }
    }

    fn finish_if_drained(&mut self) -> Vec<ProxyAction> {
        if self.queue.is_empty() && self.open_requests == 0 {
            self.to_offline();
            return vec![ProxyAction::EndRedirect];
        }
        Vec::new()
    }

    fn to_offline(&mut self) {
        self.state = ProxyState::Offline;
        self.open_requests = 0;
        self.parser.reset();
        // Orphaned correlation entries die with the redirect
        if !self.output.is_empty() {
            tracing::warn!(count = self.output.len(), "clearing orphaned transactions");
            self.output.clear();
        }
        self.envelope.clear();
    }
}
