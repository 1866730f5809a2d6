//! In-memory table store with row generations and subscriptions.
//!
//! Tables have a fixed schema declared at creation: named, typed key
//! columns and data columns over the [`CacheValue`] variant set. Every
//! row carries a generation counter that increments on modification.
//!
//! Listeners are registered per table under a `(name, owner)` pair and
//! see events in exactly the order they were applied. An event caused by
//! the listener's own source tag is delivered as
//! [`EventClass::Response`], everybody else sees a
//! [`EventClass::Request`].
//!
//! Re-entrancy: a listener runs while the table is mutably borrowed and
//! only receives a shared view of the event, so writing back into the
//! same table from inside a listener is impossible by construction — the
//! write has to be queued and applied outside the callback.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the table layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A table with the same name already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// The addressed table has not been created.
    #[error("no such table '{0}'")]
    NoSuchTable(String),

    /// Key or data columns did not match the schema.
    #[error("schema violation on table '{table}': {detail}")]
    SchemaViolation {
        /// Table name
        table: String,
        /// What was wrong
        detail: &'static str,
    },
}

/// Value variant for table cells and config entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned 8 bit.
    U8(u8),
    /// Unsigned 16 bit.
    U16(u16),
    /// Unsigned 32 bit.
    U32(u32),
    /// Unsigned 64 bit.
    U64(u64),
    /// Signed 64 bit.
    I64(i64),
    /// Text.
    Str(String),
    /// Raw bytes (server ids, payloads).
    Bytes(Vec<u8>),
    /// Session/peer tag.
    Tag(Uuid),
    /// Timestamp.
    Ts(DateTime<Utc>),
}

impl CacheValue {
    /// Column type this value inhabits.
    #[must_use]
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => ColumnType::Bool,
            Self::U8(_) => ColumnType::U8,
            Self::U16(_) => ColumnType::U16,
            Self::U32(_) => ColumnType::U32,
            Self::U64(_) => ColumnType::U64,
            Self::I64(_) => ColumnType::I64,
            Self::Str(_) => ColumnType::Str,
            Self::Bytes(_) => ColumnType::Bytes,
            Self::Tag(_) => ColumnType::Tag,
            Self::Ts(_) => ColumnType::Ts,
        })
    }

    /// Text content, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Tag content, if this is a tag value.
    #[must_use]
    pub fn as_tag(&self) -> Option<Uuid> {
        match self {
            Self::Tag(tag) => Some(*tag),
            _ => None,
        }
    }

    /// Unsigned content widened to u64.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::Bytes(v) => {
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            },
            Self::Tag(v) => write!(f, "{v}"),
            Self::Ts(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // variants mirror CacheValue
pub enum ColumnType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I64,
    Str,
    Bytes,
    Tag,
    Ts,
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
}

/// Table schema: key columns and data columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    key: Vec<Column>,
    data: Vec<Column>,
}

impl Schema {
    /// Start a schema for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), key: Vec::new(), data: Vec::new() }
    }

    /// Append a key column.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.key.push(Column { name: name.into(), ty });
        self
    }

    /// Append a data column.
    #[must_use]
    pub fn col(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.data.push(Column { name: name.into(), ty });
        self
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of a data column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.data.iter().position(|c| c.name == name)
    }
}

/// Composite row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(pub Vec<CacheValue>);

impl Key {
    /// Single-tag key, the common case for session-scoped tables.
    #[must_use]
    pub fn tag(tag: Uuid) -> Self {
        Self(vec![CacheValue::Tag(tag)])
    }

    /// Single-string key.
    #[must_use]
    pub fn str(text: impl Into<String>) -> Self {
        Self(vec![CacheValue::Str(text.into())])
    }

    /// Single-u32 key (channel ids).
    #[must_use]
    pub fn u32(value: u32) -> Self {
        Self(vec![CacheValue::U32(value)])
    }
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Row key.
    pub key: Key,
    /// Data cells in schema order.
    pub data: Vec<CacheValue>,
    /// Generation counter, incremented on every modification.
    pub generation: u64,
}

impl Record {
    /// Cell by column name.
    #[must_use]
    pub fn get<'a>(&'a self, schema: &Schema, column: &str) -> Option<&'a CacheValue> {
        self.data.get(schema.column_index(column)?)
    }
}

/// Event delivered to table listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    /// A row was inserted.
    Insert {
        /// Table name.
        table: String,
        /// Row key.
        key: Key,
        /// Inserted cells.
        data: Vec<CacheValue>,
        /// Row generation.
        generation: u64,
        /// Source tag that caused the event.
        source: Uuid,
    },
    /// A single cell was modified.
    Modify {
        /// Table name.
        table: String,
        /// Row key.
        key: Key,
        /// Modified column.
        column: String,
        /// New cell value.
        value: CacheValue,
        /// Row generation after the modification.
        generation: u64,
        /// Source tag that caused the event.
        source: Uuid,
    },
    /// A row was removed.
    Remove {
        /// Table name.
        table: String,
        /// Row key.
        key: Key,
        /// Source tag that caused the event.
        source: Uuid,
    },
    /// The whole table was cleared.
    Clear {
        /// Table name.
        table: String,
        /// Source tag that caused the event.
        source: Uuid,
    },
}

impl TableEvent {
    /// Source tag of the event.
    #[must_use]
    pub fn source(&self) -> Uuid {
        match self {
            Self::Insert { source, .. }
            | Self::Modify { source, .. }
            | Self::Remove { source, .. }
            | Self::Clear { source, .. } => *source,
        }
    }
}

/// How an event relates to the receiving listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Another source caused the event.
    Request,
    /// The listener's own source tag caused the event.
    Response,
}

type Listener = Box<dyn FnMut(&TableEvent, EventClass) + Send>;

struct Subscription {
    name: String,
    owner: Uuid,
    listener: Listener,
}

/// A single table.
pub struct Table {
    schema: Schema,
    rows: HashMap<Key, Record>,
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema)
            .field("rows", &self.rows.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl Table {
    fn new(schema: Schema) -> Self {
        Self { schema, rows: HashMap::new(), subscriptions: Vec::new() }
    }

    /// Table schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of rows.
    #[must_use]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Row by key.
    #[must_use]
    pub fn lookup(&self, key: &Key) -> Option<&Record> {
        self.rows.get(key)
    }

    /// Visit every row.
    pub fn for_each(&self, mut f: impl FnMut(&Record)) {
        for record in self.rows.values() {
            f(record);
        }
    }

    /// Rows matching a predicate, cloned out of the table.
    #[must_use]
    pub fn select(&self, mut pred: impl FnMut(&Record) -> bool) -> Vec<Record> {
        self.rows.values().filter(|r| pred(r)).cloned().collect()
    }

    /// Insert a row. Returns false if the key exists or the shape does
    /// not match the schema.
    pub fn insert(&mut self, key: Key, data: Vec<CacheValue>, generation: u64, source: Uuid) -> bool {
        if self.rows.contains_key(&key)
            || key.0.len() != self.schema.key.len()
            || data.len() != self.schema.data.len()
        {
            return false;
        }
        let record = Record { key: key.clone(), data: data.clone(), generation };
        self.rows.insert(key.clone(), record);
        self.emit(&TableEvent::Insert {
            table: self.schema.name.clone(),
            key,
            data,
            generation,
            source,
        });
        true
    }

    /// Modify one cell, bumping the row generation.
    pub fn modify(&mut self, key: &Key, column: &str, value: CacheValue, source: Uuid) -> bool {
        let Some(index) = self.schema.column_index(column) else {
            return false;
        };
        let Some(record) = self.rows.get_mut(key) else {
            return false;
        };
        record.data[index] = value.clone();
        record.generation += 1;
        let generation = record.generation;
        self.emit(&TableEvent::Modify {
            table: self.schema.name.clone(),
            key: key.clone(),
            column: column.to_string(),
            value,
            generation,
            source,
        });
        true
    }

    /// Remove a row.
    pub fn erase(&mut self, key: &Key, source: Uuid) -> bool {
        if self.rows.remove(key).is_none() {
            return false;
        }
        self.emit(&TableEvent::Remove {
            table: self.schema.name.clone(),
            key: key.clone(),
            source,
        });
        true
    }

    /// Remove every row.
    pub fn clear(&mut self, source: Uuid) {
        self.rows.clear();
        self.emit(&TableEvent::Clear { table: self.schema.name.clone(), source });
    }

    /// Attach a named listener owned by `owner`.
    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        owner: Uuid,
        listener: impl FnMut(&TableEvent, EventClass) + Send + 'static,
    ) {
        self.subscriptions.push(Subscription {
            name: name.into(),
            owner,
            listener: Box::new(listener),
        });
    }

    /// Detach one named listener of `owner`.
    pub fn unsubscribe(&mut self, name: &str, owner: Uuid) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| !(s.name == name && s.owner == owner));
        self.subscriptions.len() != before
    }

    /// Detach every listener owned by `owner`. Returns the count.
    pub fn unsubscribe_all(&mut self, owner: Uuid) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.owner != owner);
        before - self.subscriptions.len()
    }

    fn emit(&mut self, event: &TableEvent) {
        let source = event.source();
        for sub in &mut self.subscriptions {
            let class =
                if sub.owner == source { EventClass::Response } else { EventClass::Request };
            (sub.listener)(event, class);
        }
    }
}

/// Named table collection.
#[derive(Debug, Default)]
pub struct Store {
    tables: HashMap<String, Table>,
}

impl Store {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard back-office tables.
    #[must_use]
    pub fn standard() -> Self {
        let mut store = Self::new();
        for schema in standard_schemas() {
            // Names are distinct by construction
            let _ = store.create(schema);
        }
        store
    }

    /// Create a table.
    pub fn create(&mut self, schema: Schema) -> Result<(), CacheError> {
        if self.tables.contains_key(schema.name()) {
            return Err(CacheError::TableExists(schema.name().to_string()));
        }
        self.tables.insert(schema.name().to_string(), Table::new(schema));
        Ok(())
    }

    /// Shared table access.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Write table access.
    #[must_use]
    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Table names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Remove every listener `owner` holds, across all tables.
    pub fn unsubscribe_owner(&mut self, owner: Uuid) -> usize {
        self.tables.values_mut().map(|t| t.unsubscribe_all(owner)).sum()
    }
}

/// Schemas of the standard back-office tables.
fn standard_schemas() -> Vec<Schema> {
    vec![
        Schema::new("session")
            .key("tag", ColumnType::Tag)
            .col("ep", ColumnType::Str)
            .col("account", ColumnType::Str)
            .col("peer", ColumnType::Tag)
            .col("rx", ColumnType::U64)
            .col("sx", ColumnType::U64)
            .col("px", ColumnType::U64),
        Schema::new("device")
            .key("tag", ColumnType::Tag)
            .col("name", ColumnType::Str)
            .col("id", ColumnType::Str)
            .col("vFirmware", ColumnType::Str)
            .col("enabled", ColumnType::Bool),
        Schema::new("meter")
            .key("serverId", ColumnType::Bytes)
            .col("class", ColumnType::Str)
            .col("visible", ColumnType::Bool)
            .col("active", ColumnType::Bool)
            .col("lastSeen", ColumnType::Ts),
        Schema::new("target")
            .key("name", ColumnType::Str)
            .col("session", ColumnType::Tag)
            .col("peer", ColumnType::Tag)
            .col("packetSize", ColumnType::U16)
            .col("windowSize", ColumnType::U8),
        Schema::new("channel")
            .key("channel", ColumnType::U32)
            .col("source", ColumnType::U32)
            .col("target", ColumnType::Str)
            .col("owner", ColumnType::Tag)
            .col("peer", ColumnType::Tag),
        Schema::new("connection")
            .key("caller", ColumnType::Tag)
            .col("callee", ColumnType::Tag)
            .col("established", ColumnType::Ts),
        Schema::new("_Cluster")
            .key("tag", ColumnType::Tag)
            .col("class", ColumnType::Str)
            .col("account", ColumnType::Str)
            .col("ep", ColumnType::Str)
            .col("ping", ColumnType::Ts),
        Schema::new("_SysMsg")
            .key("id", ColumnType::U64)
            .col("ts", ColumnType::Ts)
            .col("severity", ColumnType::U8)
            .col("msg", ColumnType::Str),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use super::*;

    fn meter_key(id: &[u8]) -> Key {
        Key(vec![CacheValue::Bytes(id.to_vec())])
    }

    fn meter_data(class: &str) -> Vec<CacheValue> {
        vec![
            CacheValue::Str(class.into()),
            CacheValue::Bool(true),
            CacheValue::Bool(false),
            CacheValue::Ts(Utc::now()),
        ]
    }

    #[test]
    fn size_is_restored_after_insert_then_erase() {
        let mut store = Store::standard();
        let table = store.table_mut("meter").unwrap();
        let initial = table.size();

        let key = meter_key(&[1, 2, 3]);
        assert!(table.insert(key.clone(), meter_data("A"), 1, Uuid::nil()));
        assert_eq!(table.size(), initial + 1);
        assert!(table.erase(&key, Uuid::nil()));
        assert_eq!(table.size(), initial);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = Store::standard();
        let table = store.table_mut("meter").unwrap();
        let key = meter_key(&[9]);
        assert!(table.insert(key.clone(), meter_data("A"), 1, Uuid::nil()));
        assert!(!table.insert(key, meter_data("B"), 1, Uuid::nil()));
    }

    #[test]
    fn modify_bumps_the_generation() {
        let mut store = Store::standard();
        let table = store.table_mut("meter").unwrap();
        let key = meter_key(&[7]);
        table.insert(key.clone(), meter_data("A"), 1, Uuid::nil());

        assert!(table.modify(&key, "active", CacheValue::Bool(true), Uuid::nil()));
        assert_eq!(table.lookup(&key).unwrap().generation, 2);
        assert!(!table.modify(&key, "no-such-column", CacheValue::Bool(true), Uuid::nil()));
    }

    #[test]
    fn listeners_see_events_in_application_order() {
        let mut store = Store::standard();
        let table = store.table_mut("meter").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        table.subscribe("test", Uuid::nil(), move |event, _| {
            let label = match event {
                TableEvent::Insert { .. } => "insert",
                TableEvent::Modify { .. } => "modify",
                TableEvent::Remove { .. } => "remove",
                TableEvent::Clear { .. } => "clear",
            };
            sink.lock().unwrap().push(label);
        });

        let key = meter_key(&[1]);
        let source = Uuid::new_v4();
        table.insert(key.clone(), meter_data("A"), 1, source);
        table.modify(&key, "visible", CacheValue::Bool(false), source);
        table.erase(&key, source);
        table.clear(source);

        assert_eq!(*seen.lock().unwrap(), vec!["insert", "modify", "remove", "clear"]);
    }

    #[test]
    fn own_source_events_are_responses() {
        let mut store = Store::standard();
        let table = store.table_mut("meter").unwrap();
        let me = Uuid::new_v4();
        let classes = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&classes);
        table.subscribe("test", me, move |_, class| sink.lock().unwrap().push(class));

        table.insert(meter_key(&[1]), meter_data("A"), 1, me);
        table.insert(meter_key(&[2]), meter_data("A"), 1, Uuid::new_v4());

        assert_eq!(*classes.lock().unwrap(), vec![EventClass::Response, EventClass::Request]);
    }

    #[test]
    fn unsubscribe_owner_sweeps_every_table() {
        let mut store = Store::standard();
        let owner = Uuid::new_v4();
        store.table_mut("meter").unwrap().subscribe("a", owner, |_, _| {});
        store.table_mut("session").unwrap().subscribe("b", owner, |_, _| {});
        store.table_mut("session").unwrap().subscribe("c", Uuid::new_v4(), |_, _| {});

        assert_eq!(store.unsubscribe_owner(owner), 2);
    }

    /// An operation of the model-based size test.
    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8),
        Erase(u8),
        Modify(u8),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u8>().prop_map(Op::Insert),
            any::<u8>().prop_map(Op::Erase),
            any::<u8>().prop_map(Op::Modify),
        ]
    }

    proptest! {
        /// The table size always matches a plain set model, and erased
        /// keys never linger.
        #[test]
        fn size_matches_a_set_model(ops in proptest::collection::vec(arb_op(), 0..64)) {
            let mut store = Store::standard();
            let table = store.table_mut("meter").unwrap();
            let mut model = HashSet::new();

            for op in ops {
                match op {
                    Op::Insert(id) => {
                        let inserted =
                            table.insert(meter_key(&[id]), meter_data("A"), 1, Uuid::nil());
                        prop_assert_eq!(inserted, model.insert(id));
                    },
                    Op::Erase(id) => {
                        let erased = table.erase(&meter_key(&[id]), Uuid::nil());
                        prop_assert_eq!(erased, model.remove(&id));
                    },
                    Op::Modify(id) => {
                        let modified = table.modify(
                            &meter_key(&[id]),
                            "visible",
                            CacheValue::Bool(false),
                            Uuid::nil(),
                        );
                        prop_assert_eq!(modified, model.contains(&id));
                    },
                }
                prop_assert_eq!(table.size(), model.len());
            }
        }
    }
}
