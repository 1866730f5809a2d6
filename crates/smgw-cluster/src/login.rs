//! Cluster login records.
//!
//! A joining peer announces itself with `cluster.req.login`. Protocol
//! version 2 added `platform` and `pid`; version-1 peers omit them and
//! must still be accepted.

use chrono::{DateTime, Utc};
use smgw_core::cache::CacheValue;
use uuid::Uuid;

use crate::program::Program;
use crate::ClusterError;

/// Current login record version.
pub const LOGIN_VERSION: u16 = 2;

/// Login announcement of a joining peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLogin {
    /// Record version.
    pub version: u16,
    /// Account name.
    pub account: String,
    /// Password.
    pub pwd: String,
    /// Peer session tag.
    pub session_tag: Uuid,
    /// Node class, e.g. `ipt`, `store`, `setup`, `dash`.
    pub node_class: String,
    /// Timezone offset of the peer in minutes.
    pub tz_offset: i64,
    /// Peer wall clock at login.
    pub timestamp: DateTime<Utc>,
    /// Whether the peer reconnects automatically.
    pub autologin: bool,
    /// Redundancy group.
    pub group: u32,
    /// Remote endpoint as seen by the peer.
    pub remote_ep: String,
    /// Platform description (version 2).
    pub platform: String,
    /// Process id (version 2).
    pub pid: u64,
}

impl ClusterLogin {
    /// Wire function name.
    pub const FUNCTION: &'static str = "cluster.req.login";

    /// Encode as a program.
    #[must_use]
    pub fn to_program(&self) -> Program {
        Program::new(Self::FUNCTION)
            .arg(CacheValue::U16(self.version))
            .arg(CacheValue::Str(self.account.clone()))
            .arg(CacheValue::Str(self.pwd.clone()))
            .arg(CacheValue::Tag(self.session_tag))
            .arg(CacheValue::Str(self.node_class.clone()))
            .arg(CacheValue::I64(self.tz_offset))
            .arg(CacheValue::Ts(self.timestamp))
            .arg(CacheValue::Bool(self.autologin))
            .arg(CacheValue::U32(self.group))
            .arg(CacheValue::Str(self.remote_ep.clone()))
            .arg(CacheValue::Str(self.platform.clone()))
            .arg(CacheValue::U64(self.pid))
    }

    /// Decode from a program, accepting version-1 records without
    /// `platform` and `pid`.
    pub fn from_program(program: &Program) -> Result<Self, ClusterError> {
        let err = |_| ClusterError::MalformedProgram("login argument type");
        let missing = ClusterError::MalformedProgram("missing login argument");

        let str_at = |i: usize| -> Result<String, ClusterError> {
            program
                .get(i)
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or(ClusterError::MalformedProgram("login argument type"))
        };

        let version = match program.get(0) {
            Some(CacheValue::U16(v)) => *v,
            _ => return Err(missing),
        };
        let session_tag = program
            .get(3)
            .and_then(CacheValue::as_tag)
            .ok_or(ClusterError::MalformedProgram("login session tag"))?;
        let tz_offset = match program.get(5) {
            Some(CacheValue::I64(v)) => *v,
            _ => return Err(missing),
        };
        let timestamp = match program.get(6) {
            Some(CacheValue::Ts(ts)) => *ts,
            _ => return Err(missing),
        };
        let autologin = matches!(program.get(7), Some(CacheValue::Bool(true)));
        let group = program.get(8).and_then(CacheValue::as_u64).map_or(0, |v| v as u32);

        Ok(Self {
            version,
            account: str_at(1).map_err(err)?,
            pwd: str_at(2).map_err(err)?,
            session_tag,
            node_class: str_at(4).map_err(err)?,
            tz_offset,
            timestamp,
            autologin,
            group,
            remote_ep: str_at(9).unwrap_or_default(),
            // Version 1 ends here
            platform: str_at(10).unwrap_or_default(),
            pid: program.get(11).and_then(CacheValue::as_u64).unwrap_or(0),
        })
    }
}
