//! Backing Key-Value Engine Seam
//!
//! The versioned store does not talk to an embedded database directly: it
//! is written against the narrow [`KeyValueEngine`] trait, which models
//! what the store actually needs from durable ordered byte-string storage:
//!
//! - keyspace-scoped `get` / `put` / `delete`
//! - keyspace lifecycle: create, drop (bulk erasure), list by prefix
//! - `flush` and `close`
//!
//! A *keyspace* plays the role of a column family: the latest-value tier
//! is one keyspace, every time segment is another, and expiring a segment
//! drops its whole keyspace rather than deleting keys one by one.
//!
//! ## Implementations
//!
//! [`MemoryEngine`] is the bundled ordered in-memory engine, used by the
//! test suites and for ephemeral stores. Production deployments supply an
//! engine backed by an embedded database (e.g. RocksDB column families)
//! behind the same trait; the store never assumes more than the trait.
//!
//! ## Usage
//!
//! ```ignore
//! let engine: Arc<dyn KeyValueEngine> = Arc::new(MemoryEngine::new());
//! engine.create_keyspace("orders.latestValues")?;
//! engine.put("orders.latestValues", b"k", b"v")?;
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tempora_core::{Error, Result};

/// Durable ordered byte-string storage with keyspace scoping.
///
/// Implementations are internally synchronized: all methods take `&self`
/// so that handles can be shared across the store's components.
pub trait KeyValueEngine: Send + Sync {
    /// Ensure a keyspace exists. Creating an existing keyspace is a no-op.
    fn create_keyspace(&self, name: &str) -> Result<()>;

    /// Drop a keyspace and everything in it. Dropping a missing keyspace
    /// is a no-op.
    fn drop_keyspace(&self, name: &str) -> Result<()>;

    /// Names of all keyspaces starting with `prefix`, in order.
    fn list_keyspaces(&self, prefix: &str) -> Result<Vec<String>>;

    fn get(&self, keyspace: &str, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&self, keyspace: &str, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, keyspace: &str, key: &[u8]) -> Result<()>;

    /// Make previous writes durable.
    fn flush(&self) -> Result<()>;

    /// Close the engine; subsequent data operations fail with
    /// [`Error::NotOpen`]. Closing twice is a no-op.
    fn close(&self) -> Result<()>;
}

/// A view of one keyspace within an engine.
#[derive(Clone)]
pub struct Keyspace {
    name: String,
    engine: Arc<dyn KeyValueEngine>,
}

impl Keyspace {
    pub fn new(engine: Arc<dyn KeyValueEngine>, name: String) -> Self {
        Self { name, engine }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.engine.get(&self.name, key)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.engine.put(&self.name, key, value)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.engine.delete(&self.name, key)
    }

    pub fn flush(&self) -> Result<()> {
        self.engine.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace").field("name", &self.name).finish()
    }
}

/// Ordered in-memory engine: one `BTreeMap` per keyspace.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    keyspaces: RwLock<BTreeMap<String, BTreeMap<Vec<u8>, Bytes>>>,
    closed: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the full engine contents, for state comparisons in tests.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.keyspaces
            .read()
            .expect("engine lock poisoned")
            .iter()
            .map(|(name, data)| {
                let data = data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_vec()))
                    .collect();
                (name.clone(), data)
            })
            .collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotOpen);
        }
        Ok(())
    }
}

impl KeyValueEngine for MemoryEngine {
    fn create_keyspace(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.keyspaces
            .write()
            .expect("engine lock poisoned")
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    fn drop_keyspace(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.keyspaces
            .write()
            .expect("engine lock poisoned")
            .remove(name);
        Ok(())
    }

    fn list_keyspaces(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .keyspaces
            .read()
            .expect("engine lock poisoned")
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get(&self, keyspace: &str, key: &[u8]) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let keyspaces = self.keyspaces.read().expect("engine lock poisoned");
        let data = keyspaces
            .get(keyspace)
            .ok_or_else(|| Error::UnknownKeyspace(keyspace.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, keyspace: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut keyspaces = self.keyspaces.write().expect("engine lock poisoned");
        let data = keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| Error::UnknownKeyspace(keyspace.to_string()))?;
        data.insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn delete(&self, keyspace: &str, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut keyspaces = self.keyspaces.write().expect("engine lock poisoned");
        let data = keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| Error::UnknownKeyspace(keyspace.to_string()))?;
        data.remove(key);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Keyspace lifecycle
    // ---------------------------------------------------------------

    #[test]
    fn test_create_and_list() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("store.latestValues").unwrap();
        engine.create_keyspace("store.segments.1").unwrap();
        engine.create_keyspace("store.segments.2").unwrap();

        let segments = engine.list_keyspaces("store.segments.").unwrap();
        assert_eq!(segments, vec!["store.segments.1", "store.segments.2"]);
        let all = engine.list_keyspaces("store.").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_create_is_idempotent() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("ks").unwrap();
        engine.put("ks", b"k", b"v").unwrap();
        engine.create_keyspace("ks").unwrap();
        assert_eq!(engine.get("ks", b"k").unwrap(), Some(Bytes::from("v")));
    }

    #[test]
    fn test_drop_keyspace() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("ks").unwrap();
        engine.put("ks", b"k", b"v").unwrap();
        engine.drop_keyspace("ks").unwrap();
        assert!(matches!(
            engine.get("ks", b"k"),
            Err(Error::UnknownKeyspace(_))
        ));
        // dropping again is a no-op
        engine.drop_keyspace("ks").unwrap();
    }

    #[test]
    fn test_unknown_keyspace_errors() {
        let engine = MemoryEngine::new();
        assert!(matches!(
            engine.get("missing", b"k"),
            Err(Error::UnknownKeyspace(_))
        ));
        assert!(matches!(
            engine.put("missing", b"k", b"v"),
            Err(Error::UnknownKeyspace(_))
        ));
        assert!(matches!(
            engine.delete("missing", b"k"),
            Err(Error::UnknownKeyspace(_))
        ));
    }

    // ---------------------------------------------------------------
    // Data operations
    // ---------------------------------------------------------------

    #[test]
    fn test_put_get_delete() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("ks").unwrap();

        assert_eq!(engine.get("ks", b"k").unwrap(), None);
        engine.put("ks", b"k", b"v1").unwrap();
        assert_eq!(engine.get("ks", b"k").unwrap(), Some(Bytes::from("v1")));
        engine.put("ks", b"k", b"v2").unwrap();
        assert_eq!(engine.get("ks", b"k").unwrap(), Some(Bytes::from("v2")));
        engine.delete("ks", b"k").unwrap();
        assert_eq!(engine.get("ks", b"k").unwrap(), None);
    }

    #[test]
    fn test_keyspaces_are_isolated() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("a").unwrap();
        engine.create_keyspace("b").unwrap();
        engine.put("a", b"k", b"va").unwrap();
        engine.put("b", b"k", b"vb").unwrap();
        assert_eq!(engine.get("a", b"k").unwrap(), Some(Bytes::from("va")));
        assert_eq!(engine.get("b", b"k").unwrap(), Some(Bytes::from("vb")));
    }

    #[test]
    fn test_keyspace_view() {
        let engine: Arc<dyn KeyValueEngine> = Arc::new(MemoryEngine::new());
        engine.create_keyspace("ks").unwrap();
        let ks = Keyspace::new(engine, "ks".to_string());
        assert_eq!(ks.name(), "ks");
        ks.put(b"k", b"v").unwrap();
        assert_eq!(ks.get(b"k").unwrap(), Some(Bytes::from("v")));
        ks.delete(b"k").unwrap();
        assert_eq!(ks.get(b"k").unwrap(), None);
    }

    // ---------------------------------------------------------------
    // Close semantics
    // ---------------------------------------------------------------

    #[test]
    fn test_operations_after_close_fail() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("ks").unwrap();
        engine.close().unwrap();
        assert!(matches!(engine.get("ks", b"k"), Err(Error::NotOpen)));
        assert!(matches!(engine.put("ks", b"k", b"v"), Err(Error::NotOpen)));
        assert!(matches!(engine.flush(), Err(Error::NotOpen)));
        // closing again is fine
        engine.close().unwrap();
    }

    // ---------------------------------------------------------------
    // Snapshot
    // ---------------------------------------------------------------

    #[test]
    fn test_snapshot() {
        let engine = MemoryEngine::new();
        engine.create_keyspace("ks").unwrap();
        engine.put("ks", b"k1", b"v1").unwrap();
        engine.put("ks", b"k2", b"v2").unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["ks"][b"k1".as_slice()], b"v1");
        assert_eq!(snap["ks"][b"k2".as_slice()], b"v2");
    }
}
