//! Behavioural core of the smart meter gateway back office.
//!
//! Everything here is a pure state machine in the action pattern: inputs
//! go in as events, effects come out as action lists for a driver to
//! execute. No I/O happens in this crate, which keeps every lifecycle —
//! session login, proxy work cycle, cache mutation — directly testable.
//!
//! - [`cache`] — in-memory tables with row generations and ordered
//!   listener delivery, plus the path-addressed config overlay
//! - [`session`] — the IP-T server session state machine
//! - [`proxy`] — the per-gateway SML command queue and correlation map
//! - [`engine`] — the SML response engine serving proc-parameter and
//!   profile-list requests from config and op-log
//! - [`oplog`] — the bounded operation log backing `CLASS_OP_LOG`

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod oplog;
pub mod proxy;
pub mod session;

pub use cache::{CacheValue, ColumnType, Key, Schema, Store, Table, TableEvent};
pub use config::ConfigStore;
pub use engine::ResponseEngine;
pub use oplog::{OpLog, OpLogRecord};
pub use proxy::{GatewayProxy, ProxyAction, ProxyRequest};
pub use session::{Session, SessionAction, SessionConfig, SessionEvent, SessionState};
