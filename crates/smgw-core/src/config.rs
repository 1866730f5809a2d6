//! Path-addressed configuration tree.
//!
//! Configuration lives in a flat map from `/`-separated path strings to
//! typed [`SmlValue`]s. Reads come from the in-memory overlay; writes go
//! through the overlay *and* the backing store in one step, so the
//! overlay never diverges from persistence.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use smgw_proto::sml::SmlValue;
use thiserror::Error;

/// Errors raised by the configuration layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The backing store rejected a transaction.
    #[error("config backend failure: {0}")]
    Backend(String),
}

/// Persistence contract of the configuration tree.
///
/// The production backend maps to the node's key-value storage; tests
/// use [`MemoryBackend`].
pub trait ConfigBackend: Send {
    /// Load all persisted entries.
    fn load(&mut self) -> Result<Vec<(String, SmlValue)>, ConfigError>;

    /// Persist one entry.
    fn store(&mut self, path: &str, value: &SmlValue) -> Result<(), ConfigError>;

    /// Remove one entry.
    fn remove(&mut self, path: &str) -> Result<(), ConfigError>;
}

/// Backend keeping values only in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<String, SmlValue>,
}

impl MemoryBackend {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigBackend for MemoryBackend {
    fn load(&mut self) -> Result<Vec<(String, SmlValue)>, ConfigError> {
        Ok(self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn store(&mut self, path: &str, value: &SmlValue) -> Result<(), ConfigError> {
        self.entries.insert(path.to_string(), value.clone());
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), ConfigError> {
        self.entries.remove(path);
        Ok(())
    }
}

/// Join path segments with `/`.
#[must_use]
pub fn cfg_path(segments: &[&str]) -> String {
    segments.join("/")
}

/// Types a config value converts into.
pub trait FromCfg: Sized {
    /// Convert from the stored value.
    fn from_cfg(value: &SmlValue) -> Option<Self>;

    /// Convert into a stored value.
    fn into_cfg(self) -> SmlValue;
}

impl FromCfg for bool {
    fn from_cfg(value: &SmlValue) -> Option<Self> {
        match value {
            SmlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn into_cfg(self) -> SmlValue {
        SmlValue::Bool(self)
    }
}

impl FromCfg for String {
    fn from_cfg(value: &SmlValue) -> Option<Self> {
        value.as_text()
    }

    fn into_cfg(self) -> SmlValue {
        SmlValue::string(&self)
    }
}

impl FromCfg for Duration {
    fn from_cfg(value: &SmlValue) -> Option<Self> {
        value.as_u64().map(Duration::from_secs)
    }

    fn into_cfg(self) -> SmlValue {
        SmlValue::U64(self.as_secs())
    }
}

impl FromCfg for IpAddr {
    fn from_cfg(value: &SmlValue) -> Option<Self> {
        value.as_text()?.parse().ok()
    }

    fn into_cfg(self) -> SmlValue {
        SmlValue::string(&self.to_string())
    }
}

macro_rules! impl_from_cfg_uint {
    ($($ty:ty),*) => {
        $(impl FromCfg for $ty {
            fn from_cfg(value: &SmlValue) -> Option<Self> {
                value.as_u64().and_then(|v| <$ty>::try_from(v).ok())
            }

            fn into_cfg(self) -> SmlValue {
                SmlValue::U64(u64::from(self))
            }
        })*
    };
}

impl_from_cfg_uint!(u8, u16, u32, u64);

macro_rules! impl_from_cfg_int {
    ($($ty:ty),*) => {
        $(impl FromCfg for $ty {
            fn from_cfg(value: &SmlValue) -> Option<Self> {
                value.as_i64().and_then(|v| <$ty>::try_from(v).ok())
            }

            fn into_cfg(self) -> SmlValue {
                SmlValue::I64(i64::from(self))
            }
        })*
    };
}

impl_from_cfg_int!(i8, i16, i32, i64);

/// The configuration store: overlay plus backend.
pub struct ConfigStore {
    overlay: BTreeMap<String, SmlValue>,
    backend: Box<dyn ConfigBackend>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").field("entries", &self.overlay.len()).finish()
    }
}

impl ConfigStore {
    /// Open a store over `backend`, loading the overlay.
    pub fn open(mut backend: Box<dyn ConfigBackend>) -> Result<Self, ConfigError> {
        let overlay = backend.load()?.into_iter().collect();
        Ok(Self { overlay, backend })
    }

    /// In-memory store for tests and ephemeral nodes.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self { overlay: BTreeMap::new(), backend: Box::new(MemoryBackend::new()) }
    }

    /// Raw value at `path`.
    #[must_use]
    pub fn raw(&self, path: &str) -> Option<&SmlValue> {
        self.overlay.get(path)
    }

    /// Typed read with a default.
    pub fn get_cfg<T: FromCfg>(&self, path: &str, default: T) -> T {
        self.overlay.get(path).and_then(T::from_cfg).unwrap_or(default)
    }

    /// Typed transactional write.
    pub fn set_cfg<T: FromCfg>(&mut self, path: &str, value: T) -> Result<(), ConfigError> {
        self.set_raw(path, value.into_cfg())
    }

    /// Untyped transactional write.
    pub fn set_raw(&mut self, path: &str, value: SmlValue) -> Result<(), ConfigError> {
        self.backend.store(path, &value)?;
        self.overlay.insert(path.to_string(), value);
        Ok(())
    }

    /// Remove an entry.
    pub fn remove_cfg(&mut self, path: &str) -> Result<bool, ConfigError> {
        self.backend.remove(path)?;
        Ok(self.overlay.remove(path).is_some())
    }

    /// All entries below a path prefix, in path order.
    #[must_use]
    pub fn section(&self, prefix: &str) -> Vec<(String, SmlValue)> {
        let needle = format!("{prefix}/");
        self.overlay
            .range(needle.clone()..)
            .take_while(|(k, _)| k.starts_with(&needle))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.overlay.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overlay.is_empty()
    }

    /// Iterate all entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SmlValue)> {
        self.overlay.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let mut cfg = ConfigStore::ephemeral();
        cfg.set_cfg("ipt/param/0/host", "10.0.0.1".to_string()).unwrap();
        cfg.set_cfg("ipt/param/0/port", 26862u16).unwrap();
        cfg.set_cfg("sml/enabled", true).unwrap();

        assert_eq!(cfg.get_cfg("ipt/param/0/host", String::new()), "10.0.0.1");
        assert_eq!(cfg.get_cfg("ipt/param/0/port", 0u16), 26862);
        assert!(cfg.get_cfg("sml/enabled", false));
    }

    #[test]
    fn default_applies_on_missing_and_mistyped() {
        let mut cfg = ConfigStore::ephemeral();
        cfg.set_cfg("a", "text".to_string()).unwrap();
        assert_eq!(cfg.get_cfg("missing", 7u8), 7);
        assert_eq!(cfg.get_cfg("a", 7u8), 7);
    }

    #[test]
    fn writes_reach_the_backend() {
        let mut backend = MemoryBackend::new();
        backend.store("seed", &SmlValue::U8(1)).unwrap();

        let mut cfg = ConfigStore::open(Box::new(backend)).unwrap();
        assert_eq!(cfg.get_cfg("seed", 0u8), 1);

        cfg.set_cfg("fresh", 2u8).unwrap();
        assert_eq!(cfg.get_cfg("fresh", 0u8), 2);
        assert!(cfg.remove_cfg("fresh").unwrap());
        assert_eq!(cfg.get_cfg("fresh", 0u8), 0);
    }

    #[test]
    fn section_listing() {
        let mut cfg = ConfigStore::ephemeral();
        cfg.set_cfg("ipt/param/0/host", "a".to_string()).unwrap();
        cfg.set_cfg("ipt/param/1/host", "b".to_string()).unwrap();
        cfg.set_cfg("nms/port", 1u16).unwrap();

        let section = cfg.section("ipt/param");
        assert_eq!(section.len(), 2);
        assert!(section.iter().all(|(k, _)| k.starts_with("ipt/param/")));
    }

    #[test]
    fn path_join() {
        assert_eq!(cfg_path(&["ipt", "param", "0", "host"]), "ipt/param/0/host");
    }
}
