//! Master side of the cluster bus.
//!
//! The node owns the shared table store. Peers log in, subscribe to
//! tables (full replay, then incremental fan-out), replicate their own
//! rows and route push data to each other by node class. When a peer is
//! lost — disconnect or watchdog expiry — everything it owned is swept
//! and the survivors are told.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use smgw_core::cache::{CacheValue, Key, Store};
use uuid::Uuid;

use crate::login::ClusterLogin;
use crate::program::Program;
use crate::ClusterError;

/// Smallest admissible watchdog period.
pub const MIN_WATCHDOG: Duration = Duration::from_secs(5);

/// Effects the node driver executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAction {
    /// Start (or restart) the watchdog for a peer.
    StartWatchdog {
        /// Peer tag.
        peer: Uuid,
        /// Negotiated period.
        period: Duration,
    },
    /// Stop the watchdog for a peer.
    StopWatchdog {
        /// Peer tag.
        peer: Uuid,
    },
    /// Send a program to a peer.
    SendToPeer {
        /// Peer tag.
        peer: Uuid,
        /// Program to deliver.
        program: Program,
    },
    /// Close a device connection owned by a lost peer.
    ///
    /// `shutdown` suppresses further client replies during the sweep.
    CloseConnection {
        /// Session that owned the connection.
        session: Uuid,
        /// Shutdown flag.
        shutdown: bool,
    },
}

/// Master-side cluster node.
pub struct ClusterNode {
    store: Store,
    /// account → password, from the node configuration.
    accounts: HashMap<String, String>,
    /// peer → tables it subscribed to.
    subscriptions: HashMap<Uuid, HashSet<String>>,
    sysmsg_seq: u64,
}

impl std::fmt::Debug for ClusterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterNode")
            .field("peers", &self.subscriptions.len())
            .finish()
    }
}

impl ClusterNode {
    /// Node over the standard tables with the given account book.
    #[must_use]
    pub fn new(accounts: HashMap<String, String>) -> Self {
        Self {
            store: Store::standard(),
            accounts,
            subscriptions: HashMap::new(),
            sysmsg_seq: 0,
        }
    }

    /// Shared access to the table store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Write access to the table store.
    #[must_use]
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Verify a login and admit the peer.
    ///
    /// The watchdog period is the peer's heartbeat clamped to at least
    /// [`MIN_WATCHDOG`].
    pub fn login(
        &mut self,
        login: &ClusterLogin,
        heartbeat: Duration,
    ) -> Result<Vec<ClusterAction>, ClusterError> {
        let valid = self
            .accounts
            .get(&login.account)
            .is_some_and(|pwd| *pwd == login.pwd);
        if !valid {
            tracing::warn!(account = %login.account, "cluster login refused");
            return Err(ClusterError::LoginRefused(login.account.clone()));
        }

        let peer = login.session_tag;
        if let Some(table) = self.store.table_mut("_Cluster") {
            table.insert(
                Key::tag(peer),
                vec![
                    CacheValue::Str(login.node_class.clone()),
                    CacheValue::Str(login.account.clone()),
                    CacheValue::Str(login.remote_ep.clone()),
                    CacheValue::Ts(Utc::now()),
                ],
                1,
                peer,
            );
        }
        self.subscriptions.entry(peer).or_default();

        let period = heartbeat.max(MIN_WATCHDOG);
        tracing::info!(peer = %peer, class = %login.node_class, ?period, "cluster peer admitted");
        Ok(vec![ClusterAction::StartWatchdog { peer, period }])
    }

    /// `bus.req.subscribe`: replay the table, then keep the peer fed.
    pub fn subscribe(
        &mut self,
        peer: Uuid,
        table_name: &str,
    ) -> Result<Vec<ClusterAction>, ClusterError> {
        let table = self
            .store
            .table(table_name)
            .ok_or_else(|| ClusterError::NoSuchTable(table_name.to_string()))?;

        // Full replay as inserts, in a stable order
        let mut rows = table.select(|_| true);
        rows.sort_by(|a, b| a.key.0.cmp(&b.key.0));
        let replay = rows
            .into_iter()
            .map(|record| ClusterAction::SendToPeer {
                peer,
                program: insert_program(table_name, &record.key, &record.data, record.generation),
            })
            .collect();

        self.subscriptions.entry(peer).or_default().insert(table_name.to_string());
        Ok(replay)
    }

    /// `bus.req.unsubscribe`.
    pub fn unsubscribe(&mut self, peer: Uuid, table_name: &str) {
        if let Some(tables) = self.subscriptions.get_mut(&peer) {
            tables.remove(table_name);
        }
    }

    /// Apply a replicated insert and fan it out.
    pub fn db_insert(
        &mut self,
        source: Uuid,
        table_name: &str,
        key: Key,
        data: Vec<CacheValue>,
        generation: u64,
    ) -> Result<Vec<ClusterAction>, ClusterError> {
        let table = self
            .store
            .table_mut(table_name)
            .ok_or_else(|| ClusterError::NoSuchTable(table_name.to_string()))?;
        if !table.insert(key.clone(), data.clone(), generation, source) {
            tracing::warn!(table = table_name, "replicated insert rejected");
            return Ok(Vec::new());
        }
        Ok(self.fan_out(table_name, &insert_program(table_name, &key, &data, generation)))
    }

    /// Apply a replicated single-cell modification and fan it out.
    pub fn db_modify(
        &mut self,
        source: Uuid,
        table_name: &str,
        key: Key,
        column: &str,
        value: CacheValue,
    ) -> Result<Vec<ClusterAction>, ClusterError> {
        let table = self
            .store
            .table_mut(table_name)
            .ok_or_else(|| ClusterError::NoSuchTable(table_name.to_string()))?;
        if !table.modify(&key, column, value.clone(), source) {
            return Ok(Vec::new());
        }
        let program = Program::new("db.req.modify")
            .arg(CacheValue::Str(table_name.to_string()))
            .arg(key_value(&key))
            .arg(CacheValue::Str(column.to_string()))
            .arg(value);
        Ok(self.fan_out(table_name, &program))
    }

    /// Apply a replicated removal and fan it out.
    pub fn db_remove(
        &mut self,
        source: Uuid,
        table_name: &str,
        key: Key,
    ) -> Result<Vec<ClusterAction>, ClusterError> {
        let table = self
            .store
            .table_mut(table_name)
            .ok_or_else(|| ClusterError::NoSuchTable(table_name.to_string()))?;
        if !table.erase(&key, source) {
            return Ok(Vec::new());
        }
        let program = Program::new("db.req.remove")
            .arg(CacheValue::Str(table_name.to_string()))
            .arg(key_value(&key));
        Ok(self.fan_out(table_name, &program))
    }

    /// `bus.req.push.data`: deliver to one or all peers of a class.
    ///
    /// Returns the delivery count alongside the send actions.
    #[allow(clippy::too_many_arguments)]
    pub fn push_data(
        &mut self,
        seq: u64,
        class: &str,
        channel: &str,
        distribute_all: bool,
        key: Vec<u8>,
        data: Vec<u8>,
        source: Uuid,
    ) -> (u32, Vec<ClusterAction>) {
        let Some(table) = self.store.table("_Cluster") else {
            return (0, Vec::new());
        };
        let schema = table.schema().clone();
        let mut peers: Vec<Uuid> = table
            .select(|record| {
                record.get(&schema, "class").and_then(CacheValue::as_str) == Some(class)
            })
            .into_iter()
            .filter_map(|record| record.key.0.first().and_then(CacheValue::as_tag))
            .filter(|peer| *peer != source)
            .collect();
        peers.sort();

        if !distribute_all {
            peers.truncate(1);
        }

        let actions: Vec<ClusterAction> = peers
            .iter()
            .map(|&peer| ClusterAction::SendToPeer {
                peer,
                program: Program::new("bus.res.push.data")
                    .arg(CacheValue::U64(seq))
                    .arg(CacheValue::Str(channel.to_string()))
                    .arg(CacheValue::Bytes(key.clone()))
                    .arg(CacheValue::Bytes(data.clone()))
                    .arg(CacheValue::Tag(source)),
            })
            .collect();
        (peers.len() as u32, actions)
    }

    /// Sweep everything a lost peer owned.
    ///
    /// Targets, channels and sessions the peer owned disappear; device
    /// connections close with the shutdown flag; subscriptions die; the
    /// survivors get a system message.
    pub fn peer_lost(&mut self, peer: Uuid) -> Vec<ClusterAction> {
        let mut actions = Vec::new();

        // Sessions owned by the peer, with their connections
        let session_tags: Vec<Uuid> = self.owned_rows("session", "peer", peer);
        if let Some(table) = self.store.table_mut("connection") {
            let schema = table.schema().clone();
            let doomed: Vec<Key> = table
                .select(|record| {
                    let caller = record.key.0.first().and_then(CacheValue::as_tag);
                    let callee = record.get(&schema, "callee").and_then(CacheValue::as_tag);
                    caller.is_some_and(|t| session_tags.contains(&t))
                        || callee.is_some_and(|t| session_tags.contains(&t))
                })
                .into_iter()
                .map(|record| record.key)
                .collect();
            for key in doomed {
                if let Some(session) = key.0.first().and_then(CacheValue::as_tag) {
                    actions.push(ClusterAction::CloseConnection { session, shutdown: true });
                }
                table.erase(&key, peer);
            }
        }
        if let Some(table) = self.store.table_mut("session") {
            for tag in &session_tags {
                table.erase(&Key::tag(*tag), peer);
            }
        }

        // Targets and channels registered through the peer
        self.erase_owned("target", "peer", peer);
        self.erase_owned("channel", "peer", peer);

        // The peer itself
        if let Some(table) = self.store.table_mut("_Cluster") {
            table.erase(&Key::tag(peer), peer);
        }
        self.subscriptions.remove(&peer);
        self.store.unsubscribe_owner(peer);

        actions.push(ClusterAction::StopWatchdog { peer });
        actions.extend(self.system_message(1, &format!("cluster peer {peer} lost")));
        actions
    }

    /// Watchdog expiry equals peer loss.
    pub fn watchdog_expired(&mut self, peer: Uuid) -> Vec<ClusterAction> {
        tracing::warn!(peer = %peer, "watchdog expired");
        self.peer_lost(peer)
    }

    /// Insert a `_SysMsg` row and fan it out to subscribers.
    pub fn system_message(&mut self, severity: u8, text: &str) -> Vec<ClusterAction> {
        self.sysmsg_seq += 1;
        let key = Key(vec![CacheValue::U64(self.sysmsg_seq)]);
        let data = vec![
            CacheValue::Ts(Utc::now()),
            CacheValue::U8(severity),
            CacheValue::Str(text.to_string()),
        ];
        let Some(table) = self.store.table_mut("_SysMsg") else {
            return Vec::new();
        };
        table.insert(key.clone(), data.clone(), 1, Uuid::nil());
        self.fan_out("_SysMsg", &insert_program("_SysMsg", &key, &data, 1))
    }

    /// Keys of rows in `table` whose `column` equals the peer tag.
    fn owned_rows(&self, table: &str, column: &str, peer: Uuid) -> Vec<Uuid> {
        let Some(table) = self.store.table(table) else {
            return Vec::new();
        };
        let schema = table.schema().clone();
        table
            .select(|record| record.get(&schema, column).and_then(CacheValue::as_tag) == Some(peer))
            .into_iter()
            .filter_map(|record| record.key.0.first().and_then(CacheValue::as_tag))
            .collect()
    }

    /// Erase rows in `table` whose `column` equals the peer tag.
    fn erase_owned(&mut self, table_name: &str, column: &str, peer: Uuid) {
        let Some(table) = self.store.table_mut(table_name) else {
            return;
        };
        let schema = table.schema().clone();
        let doomed: Vec<Key> = table
            .select(|record| record.get(&schema, column).and_then(CacheValue::as_tag) == Some(peer))
            .into_iter()
            .map(|record| record.key)
            .collect();
        for key in doomed {
            table.erase(&key, peer);
        }
    }

    /// Send a program to every peer subscribed to `table`.
    fn fan_out(&self, table: &str, program: &Program) -> Vec<ClusterAction> {
        let mut peers: Vec<Uuid> = self
            .subscriptions
            .iter()
            .filter(|(_, tables)| tables.contains(table))
            .map(|(peer, _)| *peer)
            .collect();
        peers.sort();
        peers
            .into_iter()
            .map(|peer| ClusterAction::SendToPeer { peer, program: program.clone() })
            .collect()
    }
}

/// Encode a `db.req.insert` replication program.
fn insert_program(table: &str, key: &Key, data: &[CacheValue], generation: u64) -> Program {
    let mut program = Program::new("db.req.insert")
        .arg(CacheValue::Str(table.to_string()))
        .arg(key_value(key))
        .arg(CacheValue::U64(generation))
        .arg(CacheValue::U16(data.len() as u16));
    for value in data {
        program = program.arg(value.clone());
    }
    program
}

/// First key component; composite keys replicate as their first column.
fn key_value(key: &Key) -> CacheValue {
    key.0.first().cloned().unwrap_or(CacheValue::Null)
}
