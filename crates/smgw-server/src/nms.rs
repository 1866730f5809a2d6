//! NMS protocol: line-buffered JSON over TCP.
//!
//! Every request is one JSON object per line with `command`, `version`,
//! `source` and `credentials`; every response echoes `command`,
//! `version` and `source` and carries an `ec` field — `"ok"` or an error
//! text. The `update` command writes the firmware-update shell script;
//! the write itself is the observable effect, execution is out of scope.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smgw_core::config::ConfigStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::error::ServerError;

/// Protocol version answered and expected.
pub const NMS_VERSION: &str = "1.0";

/// Path read back by `update-status`.
pub const UPDATE_STATUS_PATH: &str = "/usr/local/CLS/etc/firmwareupdate.conf";

/// Credentials block of a request.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    #[serde(default)]
    pub user: String,
    /// Password.
    #[serde(default)]
    pub pwd: String,
}

/// One NMS request line.
#[derive(Debug, Clone, Deserialize)]
pub struct NmsRequest {
    /// Command selector.
    pub command: String,
    /// Protocol version.
    #[serde(default)]
    pub version: String,
    /// Requesting party.
    #[serde(default)]
    pub source: Option<Uuid>,
    /// Credentials.
    #[serde(default)]
    pub credentials: Credentials,
    /// Command-specific payload.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// One NMS response line.
#[derive(Debug, Clone, Serialize)]
pub struct NmsResponse {
    /// Echoed command.
    pub command: String,
    /// Protocol version.
    pub version: String,
    /// Echoed source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Uuid>,
    /// `"ok"` or an error text.
    pub ec: String,
    /// Command-specific payload.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl NmsResponse {
    fn ok(req: &NmsRequest) -> Self {
        Self {
            command: req.command.clone(),
            version: NMS_VERSION.to_string(),
            source: req.source,
            ec: "ok".to_string(),
            rest: serde_json::Map::new(),
        }
    }

    fn error(req: &NmsRequest, text: impl Into<String>) -> Self {
        Self {
            command: req.command.clone(),
            version: NMS_VERSION.to_string(),
            source: req.source,
            ec: text.into(),
            rest: serde_json::Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.rest.insert(key.to_string(), value);
        self
    }
}

/// NMS server configuration and shared state.
pub struct NmsReader {
    account: String,
    pwd: String,
    script_path: PathBuf,
    cfg: Arc<Mutex<ConfigStore>>,
}

impl std::fmt::Debug for NmsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NmsReader").field("script_path", &self.script_path).finish()
    }
}

impl NmsReader {
    /// New reader over the shared config store.
    #[must_use]
    pub fn new(
        account: impl Into<String>,
        pwd: impl Into<String>,
        script_path: impl Into<PathBuf>,
        cfg: Arc<Mutex<ConfigStore>>,
    ) -> Self {
        Self { account: account.into(), pwd: pwd.into(), script_path: script_path.into(), cfg }
    }

    /// Process one request line.
    pub fn process_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<NmsRequest>(line) {
            Ok(req) => self.process(&req),
            Err(err) => {
                tracing::warn!("undecodable nms line: {err}");
                NmsResponse {
                    command: String::new(),
                    version: NMS_VERSION.to_string(),
                    source: None,
                    ec: format!("parse error: {err}"),
                    rest: serde_json::Map::new(),
                }
            },
        };
        serde_json::to_string(&response).unwrap_or_else(|_| "{\"ec\":\"internal\"}".to_string())
    }

    /// Process one decoded request.
    pub fn process(&self, req: &NmsRequest) -> NmsResponse {
        if !self.authorized(req) {
            return NmsResponse::error(req, "unauthorized");
        }
        match req.command.as_str() {
            "merge" => self.cmd_merge(req),
            "query" => self.cmd_query(req),
            "reboot" => NmsResponse::ok(req),
            "update" => self.cmd_update(req),
            "update-status" => self.cmd_update_status(req),
            "fwversion" => NmsResponse::ok(req)
                .with("version", Value::String(env!("CARGO_PKG_VERSION").to_string())),
            "cminfos" => self.cmd_cminfos(req),
            other => NmsResponse::error(req, format!("unknown command '{other}'")),
        }
    }

    fn authorized(&self, req: &NmsRequest) -> bool {
        self.account.is_empty()
            || (req.credentials.user == self.account && req.credentials.pwd == self.pwd)
    }

    /// `merge`: fold serial-port/NMS settings into the config tree.
    fn cmd_merge(&self, req: &NmsRequest) -> NmsResponse {
        let mut cfg = lock(&self.cfg);
        let mut written = 0usize;
        for (section, value) in &req.rest {
            let Value::Object(entries) = value else {
                continue;
            };
            for (key, entry) in entries {
                let path = format!("nms/{section}/{key}");
                let stored = match entry {
                    Value::Bool(v) => cfg.set_cfg(&path, *v),
                    Value::Number(n) if n.is_u64() => {
                        cfg.set_cfg(&path, n.as_u64().unwrap_or_default())
                    },
                    Value::String(s) => cfg.set_cfg(&path, s.clone()),
                    _ => continue,
                };
                if stored.is_err() {
                    return NmsResponse::error(req, "storage failure");
                }
                written += 1;
            }
        }
        NmsResponse::ok(req).with("merged", Value::from(written))
    }

    /// `query`: read the current configuration back.
    fn cmd_query(&self, req: &NmsRequest) -> NmsResponse {
        let cfg = lock(&self.cfg);
        let mut tree = serde_json::Map::new();
        for (path, value) in cfg.iter() {
            let rendered = match value.as_text() {
                Some(text) => Value::String(text),
                None => match value.as_u64() {
                    Some(n) => Value::from(n),
                    None => Value::String(format!("{value:?}")),
                },
            };
            tree.insert(path.to_string(), rendered);
        }
        NmsResponse::ok(req).with("config", Value::Object(tree))
    }

    /// `update`: write the firmware-update script.
    fn cmd_update(&self, req: &NmsRequest) -> NmsResponse {
        let Some(Value::String(address)) = req.rest.get("address") else {
            return NmsResponse::error(req, "missing address");
        };
        let username = req
            .rest
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("anonymous");
        let path = req.rest.get("path").and_then(Value::as_str).unwrap_or("/");
        let firmware = req
            .rest
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or("firmware.bin");

        let script = format!(
            "#!/bin/sh\n# generated firmware update\nset -e\ncurl -u {username} ftp://{address}{path}{firmware} -o /tmp/{firmware}\nfwupdate /tmp/{firmware}\n",
        );
        match std::fs::write(&self.script_path, script) {
            Ok(()) => NmsResponse::ok(req)
                .with("script", Value::String(self.script_path.display().to_string())),
            Err(err) => NmsResponse::error(req, format!("cannot write script: {err}")),
        }
    }

    /// `update-status`: read the firmware-update state file.
    fn cmd_update_status(&self, req: &NmsRequest) -> NmsResponse {
        match std::fs::read_to_string(UPDATE_STATUS_PATH) {
            Ok(text) => NmsResponse::ok(req).with("status", Value::String(text)),
            Err(err) => NmsResponse::error(req, format!("no update status: {err}")),
        }
    }

    /// `cminfos`: modem / connectivity information from the config tree.
    fn cmd_cminfos(&self, req: &NmsRequest) -> NmsResponse {
        let cfg = lock(&self.cfg);
        let mut infos = serde_json::Map::new();
        for (path, value) in cfg.section("hardware") {
            if let Some(text) = value.as_text() {
                infos.insert(path, Value::String(text));
            }
        }
        NmsResponse::ok(req).with("infos", Value::Object(infos))
    }
}

/// Serve the NMS protocol on `address`.
pub async fn serve(address: &str, reader: Arc<NmsReader>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| ServerError::Config(format!("cannot bind nms '{address}': {e}")))?;
    tracing::info!("nms listener bound to {address}");

    loop {
        let (stream, remote) = listener.accept().await?;
        tracing::debug!(%remote, "nms connection");
        let reader = Arc::clone(&reader);
        tokio::spawn(async move {
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let mut response = reader.process_line(&line);
                response.push('\n');
                if write_half.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Lock a mutex, recovering from poisoning.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
