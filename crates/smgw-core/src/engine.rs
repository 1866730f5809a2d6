//! SML response engine.
//!
//! Serves `GetProcParameter.Req`, `SetProcParameter.Req` and
//! `GetProfileList.Req` against the local config store, the device
//! tables and the operation log. Responses echo the request transaction
//! id; anything unanswerable yields an attention response.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use smgw_proto::obis::{Obis, codes};
use smgw_proto::sml::{
    AttentionResponse, GetProcParameterRequest, GetProcParameterResponse, GetProfileListRequest,
    GetProfileListResponse, PeriodEntry, SetProcParameterRequest, SmlBody, SmlMessage, SmlTree,
    SmlValue,
};

use crate::cache::{CacheValue, Store};
use crate::config::ConfigStore;
use crate::oplog::OpLog;

/// Device-list index `(q, s)` below the active/visible roots.
///
/// `s` runs 1..=0xFE, then rolls over into the next `q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIndex {
    /// Value group E of the index code.
    pub q: u8,
    /// Value group F of the index code.
    pub s: u8,
}

impl DeviceIndex {
    /// First index.
    #[must_use]
    pub fn first() -> Self {
        Self { q: 1, s: 1 }
    }

    /// Next index, rolling `s` over from 0xFE into `q + 1`.
    #[must_use]
    pub fn next(self) -> Self {
        if self.s == 0xFE {
            Self { q: self.q.wrapping_add(1), s: 1 }
        } else {
            Self { q: self.q, s: self.s + 1 }
        }
    }

    /// Index code below `root` (`81 81 11/10 06 q s`).
    #[must_use]
    pub fn code(self, root: Obis) -> Obis {
        Obis::new(
            root.medium(),
            root.channel(),
            root.indicator(),
            root.mode(),
            self.q,
            self.s,
        )
    }
}

/// The response engine over its three data sources.
pub struct ResponseEngine<'a> {
    cfg: &'a mut ConfigStore,
    store: &'a Store,
    oplog: &'a OpLog,
    /// Server id this engine answers as.
    server_id: Vec<u8>,
}

impl std::fmt::Debug for ResponseEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEngine").field("server_id", &self.server_id).finish()
    }
}

impl<'a> ResponseEngine<'a> {
    /// Engine answering as `server_id`.
    pub fn new(
        cfg: &'a mut ConfigStore,
        store: &'a Store,
        oplog: &'a OpLog,
        server_id: Vec<u8>,
    ) -> Self {
        Self { cfg, store, oplog, server_id }
    }

    /// Answer a `GetProcParameter.Req`.
    pub fn get_proc_parameter(&mut self, msg: &SmlMessage, req: &GetProcParameterRequest) -> Vec<SmlMessage> {
        let Some(root) = req.path.first().copied() else {
            return vec![self.attention(msg, codes::ATTENTION_UNKNOWN_OBIS_CODE, Some("empty path"))];
        };

        let tree = match root {
            r if r == codes::ROOT_IPT_PARAM => self.ipt_param_tree(),
            r if r == codes::ROOT_DEVICE_IDENT => self.device_ident_tree(),
            r if r == codes::ROOT_MEMORY_USAGE => self.memory_usage_tree(),
            r if r == codes::ROOT_ACTIVE_DEVICES => self.device_list_tree(r, true),
            r if r == codes::ROOT_VISIBLE_DEVICES => self.device_list_tree(r, false),
            r if r == codes::ROOT_ACCESS_RIGHTS => self.access_rights_tree(),
            r if r == codes::ROOT_WMBUS_STATUS => self.wmbus_status_tree(),
            r if r == codes::IF_WMBUS => self.wmbus_if_tree(),
            other => {
                tracing::warn!(root = %other, "get-proc-parameter on unknown root");
                return vec![self.attention(msg, codes::ATTENTION_UNKNOWN_OBIS_CODE, None)];
            },
        };

        vec![SmlMessage::new(
            msg.trx.clone(),
            msg.group_no,
            0,
            SmlBody::GetProcParameterResponse(GetProcParameterResponse {
                server_id: Bytes::copy_from_slice(&self.server_id),
                path: req.path.clone(),
                tree,
            }),
        )]
    }

    /// Answer a `SetProcParameter.Req` by writing into the config tree.
    pub fn set_proc_parameter(&mut self, msg: &SmlMessage, req: &SetProcParameterRequest) -> Vec<SmlMessage> {
        let Some(root) = req.path.first().copied() else {
            return vec![self.attention(msg, codes::ATTENTION_UNKNOWN_OBIS_CODE, Some("empty path"))];
        };

        let known = root == codes::ROOT_IPT_PARAM
            || root == codes::IF_WMBUS
            || root == codes::REBOOT
            || root == codes::ROOT_ACCESS_RIGHTS;
        if !known {
            tracing::warn!(root = %root, "set-proc-parameter on unknown root");
            return vec![self.attention(msg, codes::ATTENTION_UNKNOWN_OBIS_CODE, None)];
        }

        if root == codes::REBOOT {
            // The write is acknowledged; the actual reboot is outside the core
            return vec![self.attention(msg, codes::ATTENTION_OK, None)];
        }

        let mut ok = true;
        store_tree(self.cfg, &obis_cfg_path(&req.path), &req.tree, &mut ok);
        let code = if ok { codes::ATTENTION_OK } else { codes::ATTENTION_UNSUPPORTED_DATA_TYPE };
        vec![self.attention(msg, code, None)]
    }

    /// Answer a `GetProfileList.Req` on the operation log.
    pub fn get_profile_list(&mut self, msg: &SmlMessage, req: &GetProfileListRequest) -> Vec<SmlMessage> {
        let Some(root) = req.path.first().copied() else {
            return vec![self.attention(msg, codes::ATTENTION_UNKNOWN_OBIS_CODE, Some("empty path"))];
        };
        if root != codes::CLASS_OP_LOG {
            return vec![self.attention(msg, codes::ATTENTION_UNKNOWN_OBIS_CODE, None)];
        }

        let begin = epoch(req.begin.unwrap_or(0));
        let end = req.end.map_or_else(Utc::now, |e| epoch(e));

        self.oplog
            .query(begin, end)
            .into_iter()
            .map(|record| {
                let act_time = record.ts.timestamp() as u32;
                let entries = vec![
                    PeriodEntry {
                        name: codes::CLASS_EVENT,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::U32(record.event),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::OP_LOG_PEER_ADDRESS,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::string(&record.peer),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::OP_LOG_FIELD_STRENGTH,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::U8(record.rssi),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::OP_LOG_CELL,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::U16(record.cell),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::OP_LOG_AREA_CODE,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::U16(record.area),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::OP_LOG_PROVIDER,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::U32(record.provider),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::CURRENT_UTC,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::Timestamp(act_time),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::SERIAL_NR,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::octet(&record.server_id),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::PUSH_TARGET,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::string(&record.target),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::PUSH_OPERATIONS,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::U32(record.push_ops),
                        signature: None,
                    },
                    PeriodEntry {
                        name: codes::OP_LOG_DETAILS,
                        unit: 0,
                        scaler: 0,
                        value: SmlValue::string(&record.details),
                        signature: None,
                    },
                ];
                SmlMessage::new(
                    msg.trx.clone(),
                    msg.group_no,
                    0,
                    SmlBody::GetProfileListResponse(GetProfileListResponse {
                        server_id: Bytes::copy_from_slice(&self.server_id),
                        act_time: Some(act_time),
                        reg_period: 900,
                        path: req.path.clone(),
                        val_time: Some(act_time),
                        status: 0,
                        entries,
                        raw_data: None,
                        signature: None,
                    }),
                )
            })
            .collect()
    }

    fn attention(&self, msg: &SmlMessage, code: Obis, text: Option<&str>) -> SmlMessage {
        SmlMessage::new(
            msg.trx.clone(),
            msg.group_no,
            0,
            SmlBody::AttentionResponse(AttentionResponse {
                server_id: Bytes::copy_from_slice(&self.server_id),
                code,
                message: text.map(str::to_string),
                details: None,
            }),
        )
    }

    /// `81 49 0D 07 00 FF`: one subtree per configured redundancy.
    fn ipt_param_tree(&self) -> SmlTree {
        let mut children = Vec::new();
        for idx in 0u8..2 {
            let base = format!("ipt/param/{idx}");
            let host = self.cfg.get_cfg(&format!("{base}/host"), String::new());
            if host.is_empty() {
                continue;
            }
            let record = Obis::new(0x81, 0x49, 0x0D, 0x07, 0x00, idx + 1);
            children.push(SmlTree::node(
                record,
                vec![
                    SmlTree::leaf(
                        Obis::new(0x81, 0x49, 0x17, 0x07, 0x00, idx + 1),
                        SmlValue::string(&host),
                    ),
                    SmlTree::leaf(
                        Obis::new(0x81, 0x49, 0x1A, 0x07, 0x00, idx + 1),
                        SmlValue::U16(self.cfg.get_cfg(&format!("{base}/port"), 26862u16)),
                    ),
                    SmlTree::leaf(
                        Obis::new(0x81, 0x49, 0x63, 0x3C, 0x01, idx + 1),
                        SmlValue::string(&self.cfg.get_cfg(&format!("{base}/account"), String::new())),
                    ),
                ],
            ));
        }
        SmlTree::node(codes::ROOT_IPT_PARAM, children)
    }

    /// `81 81 C7 82 01 FF`: manufacturer, class, serial and firmware.
    fn device_ident_tree(&self) -> SmlTree {
        let manufacturer = self.cfg.get_cfg("device/manufacturer", "solosTec".to_string());
        let class = self.cfg.get_cfg("device/class", "MUC-LAN/DSL".to_string());
        let firmware = self.cfg.get_cfg("device/firmware", "0.9".to_string());
        SmlTree::node(
            codes::ROOT_DEVICE_IDENT,
            vec![
                SmlTree::leaf(codes::DEVICE_CLASS, SmlValue::string(&class)),
                SmlTree::leaf(codes::DATA_MANUFACTURER, SmlValue::string(&manufacturer)),
                SmlTree::leaf(codes::SERIAL_NR, SmlValue::octet(&self.server_id)),
                SmlTree::node(
                    codes::ROOT_FIRMWARE,
                    vec![
                        SmlTree::leaf(codes::DATA_FIRMWARE_VERSION, SmlValue::string(&firmware)),
                        SmlTree::leaf(codes::DATA_FIRMWARE_ACTIVE, SmlValue::Bool(true)),
                    ],
                ),
            ],
        )
    }

    /// `00 80 80 00 10 FF`: mirror and tmp usage percentages.
    fn memory_usage_tree(&self) -> SmlTree {
        SmlTree::node(
            codes::ROOT_MEMORY_USAGE,
            vec![
                SmlTree::leaf(
                    codes::MEMORY_USAGE_MIRROR,
                    SmlValue::U8(self.cfg.get_cfg("memory/mirror", 0u8)),
                ),
                SmlTree::leaf(
                    codes::MEMORY_USAGE_TMP,
                    SmlValue::U8(self.cfg.get_cfg("memory/tmp", 0u8)),
                ),
            ],
        )
    }

    /// One subtree per known meter, indexed `81 81 1x 06 q s`.
    fn device_list_tree(&self, root: Obis, active_only: bool) -> SmlTree {
        let mut children = Vec::new();
        let mut index = DeviceIndex::first();
        if let Some(table) = self.store.table("meter") {
            let schema = table.schema().clone();
            let mut rows = table.select(|record| {
                let flag = if active_only { "active" } else { "visible" };
                matches!(record.get(&schema, flag), Some(CacheValue::Bool(true)))
            });
            rows.sort_by(|a, b| a.key.0.cmp(&b.key.0));
            for row in rows {
                let CacheValue::Bytes(server_id) = &row.key.0[0] else {
                    continue;
                };
                let class = row
                    .get(&schema, "class")
                    .and_then(CacheValue::as_str)
                    .unwrap_or("")
                    .to_string();
                let seen = match row.get(&schema, "lastSeen") {
                    Some(CacheValue::Ts(ts)) => ts.timestamp() as u32,
                    _ => 0,
                };
                children.push(SmlTree::node(
                    index.code(root),
                    vec![
                        SmlTree::leaf(codes::SERIAL_NR, SmlValue::octet(server_id)),
                        SmlTree::leaf(codes::DEVICE_CLASS, SmlValue::string(&class)),
                        SmlTree::leaf(codes::CURRENT_UTC, SmlValue::Timestamp(seen)),
                    ],
                ));
                index = index.next();
            }
        }
        SmlTree::node(root, children)
    }

    /// `81 81 81 60 FF FF`: one subtree per configured account.
    fn access_rights_tree(&self) -> SmlTree {
        let mut children = Vec::new();
        for (idx, (_, value)) in self.cfg.section("access/user").into_iter().enumerate() {
            let Some(name) = value.as_text() else { continue };
            children.push(SmlTree::leaf(
                Obis::new(0x81, 0x81, 0x81, 0x60, 0x01, (idx + 1) as u8),
                SmlValue::string(&name),
            ));
        }
        SmlTree::node(codes::ROOT_ACCESS_RIGHTS, children)
    }

    /// `81 06 0F 06 00 FF`: wireless adapter status.
    fn wmbus_status_tree(&self) -> SmlTree {
        SmlTree::node(
            codes::ROOT_WMBUS_STATUS,
            vec![
                SmlTree::leaf(
                    Obis::new(0x81, 0x06, 0x0F, 0x06, 0x01, 0xFF),
                    SmlValue::string(&self.cfg.get_cfg("wmbus/manufacturer", String::new())),
                ),
                SmlTree::leaf(
                    Obis::new(0x81, 0x06, 0x0F, 0x06, 0x02, 0xFF),
                    SmlValue::string(&self.cfg.get_cfg("wmbus/firmware", String::new())),
                ),
            ],
        )
    }

    /// `81 06 19 07 00 FF`: wireless interface configuration.
    fn wmbus_if_tree(&self) -> SmlTree {
        SmlTree::node(
            codes::IF_WMBUS,
            vec![SmlTree::leaf(
                codes::W_MBUS_PROTOCOL,
                SmlValue::U8(self.cfg.get_cfg("wmbus/protocol", 0u8)),
            )],
        )
    }
}

/// Config path for an OBIS request path: hex segments joined with `/`.
fn obis_cfg_path(path: &[Obis]) -> String {
    path.iter().map(Obis::to_hex).collect::<Vec<_>>().join("/")
}

/// Store every leaf of `tree` below `prefix`.
fn store_tree(cfg: &mut ConfigStore, prefix: &str, tree: &SmlTree, ok: &mut bool) {
    let path = format!("{prefix}/{}", tree.name.to_hex());
    if let Some(value) = &tree.value {
        if cfg.set_raw(&path, value.clone()).is_err() {
            *ok = false;
        }
    }
    for child in &tree.children {
        store_tree(cfg, &path, child, ok);
    }
}

fn epoch(secs: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(secs), 0).single().unwrap_or_else(Utc::now)
}
