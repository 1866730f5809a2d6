//! Command-line surface of the node.
//!
//! `smgw-server` runs the node by default; the subcommands manage the
//! configuration store and help during commissioning. Exit code 0 means
//! success, anything non-zero is a configuration error.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use smgw_core::config::ConfigStore;
use smgw_proto::sml::SmlValue;

use crate::error::ServerError;

/// Smart meter gateway back-office node.
#[derive(Debug, Parser)]
#[command(name = "smgw-server", version, about)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, default_value = "smgw.json")]
    pub config: PathBuf,

    /// Configuration block to use.
    #[arg(long, default_value_t = 0)]
    pub config_index: usize,

    /// Subcommand; the default is to run the node.
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

/// Value types accepted by `set-config`.
pub const SET_CONFIG_TYPES: &[&str] = &[
    "bool", "u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64", "s", "chrono:sec", "chrono:min",
    "ip:address",
];

/// Management subcommands.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Initialise the configuration storage.
    InitDb,
    /// Transfer the selected file block into the configuration storage.
    TransferConfig,
    /// Print every stored configuration entry.
    ListConfig,
    /// Remove every stored configuration entry.
    ClearConfig,
    /// Set one configuration entry: `path value type`.
    SetConfig {
        /// `/`-separated path.
        path: String,
        /// Value text.
        value: String,
        /// One of the `SET_CONFIG_TYPES`.
        #[arg(default_value = "s")]
        ty: String,
    },
    /// Print the stored profile with the given number.
    DumpProfile {
        /// Profile number.
        number: u32,
    },
    /// Probe an IP-T master: `user:pwd@host:port`.
    TryConnect {
        /// Connection string.
        target: String,
    },
    /// Write a fresh default configuration file.
    CreateConfig,
}

/// Parsed `try-connect` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Account name.
    pub user: String,
    /// Password.
    pub pwd: String,
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
}

/// Parse `user:pwd@host:port`.
pub fn parse_connect_target(text: &str) -> Result<ConnectTarget, ServerError> {
    let err = || ServerError::Config(format!("expected user:pwd@host:port, got '{text}'"));
    let (credentials, endpoint) = text.split_once('@').ok_or_else(err)?;
    let (user, pwd) = credentials.split_once(':').ok_or_else(err)?;
    let (host, port) = endpoint.rsplit_once(':').ok_or_else(err)?;
    if user.is_empty() || host.is_empty() {
        return Err(err());
    }
    let port: u16 = port.parse().map_err(|_| err())?;
    Ok(ConnectTarget {
        user: user.to_string(),
        pwd: pwd.to_string(),
        host: host.to_string(),
        port,
    })
}

/// Parse a typed `set-config` value.
pub fn parse_typed_value(value: &str, ty: &str) -> Result<SmlValue, ServerError> {
    let err = |detail: String| ServerError::Config(detail);
    Ok(match ty {
        "bool" => SmlValue::Bool(matches!(value, "true" | "1" | "on")),
        "u8" => SmlValue::U8(value.parse().map_err(|e| err(format!("u8: {e}")))?),
        "u16" => SmlValue::U16(value.parse().map_err(|e| err(format!("u16: {e}")))?),
        "u32" => SmlValue::U32(value.parse().map_err(|e| err(format!("u32: {e}")))?),
        "u64" => SmlValue::U64(value.parse().map_err(|e| err(format!("u64: {e}")))?),
        "i8" => SmlValue::I8(value.parse().map_err(|e| err(format!("i8: {e}")))?),
        "i16" => SmlValue::I16(value.parse().map_err(|e| err(format!("i16: {e}")))?),
        "i32" => SmlValue::I32(value.parse().map_err(|e| err(format!("i32: {e}")))?),
        "i64" => SmlValue::I64(value.parse().map_err(|e| err(format!("i64: {e}")))?),
        "s" => SmlValue::string(value),
        "chrono:sec" => {
            let secs: u64 = value.parse().map_err(|e| err(format!("seconds: {e}")))?;
            SmlValue::U64(Duration::from_secs(secs).as_secs())
        },
        "chrono:min" => {
            let minutes: u64 = value.parse().map_err(|e| err(format!("minutes: {e}")))?;
            SmlValue::U64(Duration::from_secs(minutes * 60).as_secs())
        },
        "ip:address" => {
            let addr: IpAddr = value.parse().map_err(|e| err(format!("ip address: {e}")))?;
            SmlValue::string(&addr.to_string())
        },
        other => {
            return Err(err(format!(
                "unknown type '{other}', expected one of {SET_CONFIG_TYPES:?}"
            )));
        },
    })
}

/// Run `set-config` against a store.
pub fn run_set_config(
    store: &mut ConfigStore,
    path: &str,
    value: &str,
    ty: &str,
) -> Result<(), ServerError> {
    let value = parse_typed_value(value, ty)?;
    store.set_raw(path, value).map_err(ServerError::from)
}

/// Render `list-config` lines.
#[must_use]
pub fn render_config(store: &ConfigStore) -> Vec<String> {
    store
        .iter()
        .map(|(path, value)| format!("{path} = {value:?}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn connect_target_parses() {
        let target = parse_connect_target("gw:secret@10.0.0.1:26862").unwrap();
        assert_eq!(
            target,
            ConnectTarget {
                user: "gw".into(),
                pwd: "secret".into(),
                host: "10.0.0.1".into(),
                port: 26862,
            }
        );
        assert!(parse_connect_target("no-at-sign").is_err());
        assert!(parse_connect_target("u:p@host:not-a-port").is_err());
    }

    #[test]
    fn typed_values_parse() {
        assert_eq!(parse_typed_value("true", "bool").unwrap(), SmlValue::Bool(true));
        assert_eq!(parse_typed_value("255", "u8").unwrap(), SmlValue::U8(255));
        assert_eq!(parse_typed_value("-4", "i16").unwrap(), SmlValue::I16(-4));
        assert_eq!(parse_typed_value("90", "chrono:min").unwrap(), SmlValue::U64(5400));
        assert_eq!(
            parse_typed_value("192.168.1.1", "ip:address").unwrap(),
            SmlValue::string("192.168.1.1")
        );
        assert!(parse_typed_value("256", "u8").is_err());
        assert!(parse_typed_value("x", "no-such-type").is_err());
    }

    #[test]
    fn set_and_render_config() {
        let mut store = ConfigStore::ephemeral();
        run_set_config(&mut store, "sml/enabled", "true", "bool").unwrap();
        run_set_config(&mut store, "ipt/param/0/host", "10.0.0.1", "s").unwrap();

        let lines = render_config(&store);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.starts_with("sml/enabled")));
    }
}
