//! Node configuration file.
//!
//! The file is UTF-8 JSON: a top-level array of configuration blocks,
//! one of which is selected by numeric index (`--config-index`). The
//! selected block seeds the path-addressed config store and provides the
//! listener endpoints and credentials.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smgw_core::config::{ConfigBackend, ConfigError, ConfigStore};
use smgw_proto::sml::SmlValue;
use uuid::Uuid;

use crate::error::ServerError;

/// One IP-T redundancy entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IptRedundancy {
    /// Host to connect or bind to.
    pub host: String,
    /// Service (port) as text.
    pub service: String,
    /// Account name.
    pub account: String,
    /// Password.
    pub pwd: String,
    /// Default scramble key as hex text.
    #[serde(rename = "def-sk", default)]
    pub def_sk: String,
    /// Whether the stream is scrambled.
    #[serde(default)]
    pub scrambled: bool,
    /// Monitor interval in seconds.
    #[serde(default = "default_monitor")]
    pub monitor: u32,
}

fn default_monitor() -> u32 {
    60
}

/// The `sml` server block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmlBlock {
    /// Bind address.
    #[serde(default = "default_address")]
    pub address: String,
    /// Bind service (port) as text.
    #[serde(default = "default_sml_service")]
    pub service: String,
    /// Whether discovery is answered.
    #[serde(default)]
    pub discover: bool,
    /// Account the gateways log in with.
    pub account: String,
    /// Password the gateways log in with.
    pub pwd: String,
    /// Whether the SML server runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Accept every server id, not only configured ones.
    #[serde(rename = "accept-all-ids", default)]
    pub accept_all_ids: bool,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_sml_service() -> String {
    "26862".to_string()
}

fn default_true() -> bool {
    true
}

/// The `nms` block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NmsBlock {
    /// Bind address.
    #[serde(default = "default_address")]
    pub address: String,
    /// Bind service (port) as text.
    #[serde(default = "default_nms_service")]
    pub service: String,
    /// NMS account.
    #[serde(default)]
    pub account: String,
    /// NMS password.
    #[serde(default)]
    pub pwd: String,
    /// Whether the NMS server runs.
    #[serde(default)]
    pub enabled: bool,
    /// Where the firmware-update script is written.
    #[serde(rename = "script-path", default = "default_script_path")]
    pub script_path: String,
}

fn default_nms_service() -> String {
    "7261".to_string()
}

fn default_script_path() -> String {
    "/tmp/update.sh".to_string()
}

/// One selected configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Directory for log output.
    #[serde(rename = "log-dir", default = "default_log_dir")]
    pub log_dir: String,
    /// Log level filter.
    #[serde(rename = "log-level", default = "default_log_level")]
    pub log_level: String,
    /// Node tag.
    #[serde(default = "Uuid::new_v4")]
    pub tag: Uuid,
    /// Key-value storage contract, passed to the backend untouched.
    #[serde(rename = "DB", default)]
    pub db: HashMap<String, String>,
    /// SML server block.
    pub sml: SmlBlock,
    /// NMS block.
    #[serde(default)]
    pub nms: Option<NmsBlock>,
    /// IP-T redundancies.
    #[serde(default)]
    pub ipt: Vec<IptRedundancy>,
    /// Seed values for the `ipt-param` tree, path → text value.
    #[serde(rename = "ipt-param", default)]
    pub ipt_param: HashMap<String, String>,
    /// Hardware description, path → text value.
    #[serde(default)]
    pub hardware: HashMap<String, String>,
    /// Wireless M-Bus interface, path → text value.
    #[serde(rename = "wireless-LMN", default)]
    pub wireless_lmn: HashMap<String, String>,
    /// Wired M-Bus interface, path → text value.
    #[serde(rename = "wired-LMN", default)]
    pub wired_lmn: HashMap<String, String>,
    /// IEC 62056-21 interface, path → text value.
    #[serde(rename = "if-1107", default)]
    pub if_1107: HashMap<String, String>,
    /// M-Bus options, path → text value.
    #[serde(default)]
    pub mbus: HashMap<String, String>,
    /// Virtual meter definitions, path → text value.
    #[serde(rename = "virtual-meter", default)]
    pub virtual_meter: HashMap<String, String>,
}

fn default_log_dir() -> String {
    ".".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load the configuration block at `index` from `path`.
pub fn load_config(path: &Path, index: usize) -> Result<FileConfig, ServerError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("cannot read '{}': {e}", path.display())))?;
    let blocks: Vec<FileConfig> = serde_json::from_str(&text)?;
    blocks.into_iter().nth(index).ok_or_else(|| {
        ServerError::Config(format!("config index {index} out of range"))
    })
}

/// Seed a config store from the selected block.
pub fn seed_config_store(cfg: &FileConfig, store: &mut ConfigStore) -> Result<(), ConfigError> {
    for (idx, redundancy) in cfg.ipt.iter().enumerate() {
        let base = format!("ipt/param/{idx}");
        store.set_cfg(&format!("{base}/host"), redundancy.host.clone())?;
        store.set_cfg(
            &format!("{base}/port"),
            redundancy.service.parse::<u16>().unwrap_or(26862),
        )?;
        store.set_cfg(&format!("{base}/account"), redundancy.account.clone())?;
        store.set_cfg(&format!("{base}/pwd"), redundancy.pwd.clone())?;
        store.set_cfg(&format!("{base}/scrambled"), redundancy.scrambled)?;
    }
    for (section, map) in [
        ("ipt-param", &cfg.ipt_param),
        ("hardware", &cfg.hardware),
        ("wmbus", &cfg.wireless_lmn),
        ("wired-lmn", &cfg.wired_lmn),
        ("if-1107", &cfg.if_1107),
        ("mbus", &cfg.mbus),
        ("virtual-meter", &cfg.virtual_meter),
    ] {
        for (key, value) in map {
            store.set_cfg(&format!("{section}/{key}"), value.clone())?;
        }
    }
    Ok(())
}

/// Config backend persisting to a JSON file.
///
/// Values are stored typed: booleans and integers keep their type, all
/// other values round-trip as text.
#[derive(Debug)]
pub struct JsonBackend {
    path: std::path::PathBuf,
    entries: HashMap<String, serde_json::Value>,
}

impl JsonBackend {
    /// Open (or create) the backing file.
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| ConfigError::Backend(e.to_string()))?,
            Err(_) => HashMap::new(),
        };
        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| ConfigError::Backend(e.to_string()))?;
        std::fs::write(&self.path, text).map_err(|e| ConfigError::Backend(e.to_string()))
    }
}

fn to_json(value: &SmlValue) -> serde_json::Value {
    match value {
        SmlValue::Bool(v) => serde_json::Value::Bool(*v),
        SmlValue::U8(v) => serde_json::json!(v),
        SmlValue::U16(v) => serde_json::json!(v),
        SmlValue::U32(v) => serde_json::json!(v),
        SmlValue::U64(v) => serde_json::json!(v),
        SmlValue::I8(v) => serde_json::json!(v),
        SmlValue::I16(v) => serde_json::json!(v),
        SmlValue::I32(v) => serde_json::json!(v),
        SmlValue::I64(v) => serde_json::json!(v),
        SmlValue::Timestamp(v) => serde_json::json!(v),
        SmlValue::Octet(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => serde_json::Value::String(text.to_string()),
            Err(_) => serde_json::Value::String(
                bytes.iter().map(|b| format!("{b:02x}")).collect(),
            ),
        },
        SmlValue::None => serde_json::Value::Null,
    }
}

fn from_json(value: &serde_json::Value) -> SmlValue {
    match value {
        serde_json::Value::Bool(v) => SmlValue::Bool(*v),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                SmlValue::U64(u)
            } else if let Some(i) = n.as_i64() {
                SmlValue::I64(i)
            } else {
                SmlValue::None
            }
        },
        serde_json::Value::String(s) => SmlValue::string(s),
        _ => SmlValue::None,
    }
}

impl ConfigBackend for JsonBackend {
    fn load(&mut self) -> Result<Vec<(String, SmlValue)>, ConfigError> {
        Ok(self.entries.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
    }

    fn store(&mut self, path: &str, value: &SmlValue) -> Result<(), ConfigError> {
        self.entries.insert(path.to_string(), to_json(value));
        self.flush()
    }

    fn remove(&mut self, path: &str) -> Result<(), ConfigError> {
        self.entries.remove(path);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"[
        {
            "log-dir": "/var/log/smgw",
            "log-level": "debug",
            "tag": "7f3c69cd-0a22-44a7-92b1-0d1437d4ea86",
            "DB": { "file-name": "store.json" },
            "sml": {
                "address": "0.0.0.0",
                "service": "26862",
                "account": "operator",
                "pwd": "operator",
                "accept-all-ids": true
            },
            "nms": { "address": "0.0.0.0", "service": "7261", "enabled": true },
            "ipt": [
                { "host": "127.0.0.1", "service": "26862", "account": "gw", "pwd": "gw",
                  "def-sk": "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20",
                  "scrambled": true }
            ],
            "wireless-LMN": { "protocol": "1" }
        },
        {
            "sml": { "account": "second", "pwd": "second" }
        }
    ]"#;

    fn write_sample() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn block_selection_by_index() {
        let file = write_sample();
        let first = load_config(file.path(), 0).unwrap();
        assert_eq!(first.sml.account, "operator");
        assert_eq!(first.log_level, "debug");
        assert!(first.sml.accept_all_ids);
        assert_eq!(first.ipt.len(), 1);
        assert!(first.ipt[0].scrambled);

        let second = load_config(file.path(), 1).unwrap();
        assert_eq!(second.sml.account, "second");
        // Defaults fill everything the block leaves out
        assert_eq!(second.sml.service, "26862");

        assert!(load_config(file.path(), 2).is_err());
    }

    #[test]
    fn seeding_populates_the_path_tree() {
        let file = write_sample();
        let cfg = load_config(file.path(), 0).unwrap();
        let mut store = ConfigStore::ephemeral();
        seed_config_store(&cfg, &mut store).unwrap();

        assert_eq!(store.get_cfg("ipt/param/0/host", String::new()), "127.0.0.1");
        assert_eq!(store.get_cfg("ipt/param/0/port", 0u16), 26862);
        assert_eq!(store.get_cfg("wmbus/protocol", String::new()), "1");
    }

    #[test]
    fn json_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let backend = JsonBackend::open(&path).unwrap();
            let mut store = ConfigStore::open(Box::new(backend)).unwrap();
            store.set_cfg("sml/enabled", true).unwrap();
            store.set_cfg("device/manufacturer", "solosTec".to_string()).unwrap();
        }

        let backend = JsonBackend::open(&path).unwrap();
        let store = ConfigStore::open(Box::new(backend)).unwrap();
        assert!(store.get_cfg("sml/enabled", false));
        assert_eq!(store.get_cfg("device/manufacturer", String::new()), "solosTec");
    }
}
