//! In-memory storage engine
//!
//! A BTreeMap-based engine with IndexedDB's versioning rules, for testing
//! and native tools. Databases live as long as the engine (and its clones);
//! nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::config::IndexConfig;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{
    EngineConnection, SchemaUpgrade, StorageEngine, UpgradeHandler, VersionChange,
};
use crate::key::{Key, KeyPath};

/// Engine operations that can be made to fail with [`MemoryEngine::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    Open,
    Put,
    GetAll,
    Get,
    Delete,
    Clear,
}

/// In-memory storage engine.
///
/// Clones share the same databases, so a test can keep a handle to inspect
/// or sabotage the engine it passed to a manager.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

#[derive(Debug, Default)]
struct EngineState {
    databases: HashMap<String, Database>,
    faults: Vec<(EngineOp, EngineError)>,
    opens: usize,
}

#[derive(Debug, Default)]
struct Database {
    version: u32,
    stores: BTreeMap<String, MemStore>,
    connections: usize,
}

#[derive(Debug, Clone)]
struct MemStore {
    key_path: KeyPath,
    indexes: Vec<IndexConfig>,
    records: BTreeMap<Key, Value>,
}

impl MemoryEngine {
    /// Create an engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `op` fail with `err`. Faults queue up per operation.
    pub fn fail_next(&self, op: EngineOp, err: EngineError) {
        self.state.lock().faults.push((op, err));
    }

    /// Number of successful opens so far.
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Stored version of `db`, if it exists.
    pub fn database_version(&self, db: &str) -> Option<u32> {
        self.state.lock().databases.get(db).map(|d| d.version)
    }

    /// Store names of `db` (empty if it doesn't exist).
    pub fn store_names(&self, db: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(db)
            .map(|d| d.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Index names of `store` in `db`.
    pub fn index_names(&self, db: &str, store: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(db)
            .and_then(|d| d.stores.get(store))
            .map(|s| s.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of records in `store` of `db`.
    pub fn record_count(&self, db: &str, store: &str) -> usize {
        self.state
            .lock()
            .databases
            .get(db)
            .and_then(|d| d.stores.get(store))
            .map(|s| s.records.len())
            .unwrap_or(0)
    }

    /// Number of live connections to `db`.
    pub fn connections(&self, db: &str) -> usize {
        self.state
            .lock()
            .databases
            .get(db)
            .map(|d| d.connections)
            .unwrap_or(0)
    }

    fn take_fault(&self, op: EngineOp) -> EngineResult<()> {
        let mut state = self.state.lock();
        match state.faults.iter().position(|(o, _)| *o == op) {
            Some(i) => Err(state.faults.remove(i).1),
            None => Ok(()),
        }
    }

    /// Run `f` against `store` of `db` under the engine lock.
    fn with_store<R>(
        &self,
        db: &str,
        store: &str,
        f: impl FnOnce(&mut MemStore) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut state = self.state.lock();
        let database = state
            .databases
            .get_mut(db)
            .ok_or_else(|| EngineError::Backend(format!("database '{}' was deleted", db)))?;
        let store = database
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::UnknownStore(store.to_string()))?;
        f(store)
    }
}

#[async_trait(?Send)]
impl StorageEngine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHandler,
    ) -> EngineResult<MemoryConnection> {
        // Opening is asynchronous in real engines; give concurrent callers a
        // chance to interleave.
        tokio::task::yield_now().await;
        self.take_fault(EngineOp::Open)?;

        let mut state = self.state.lock();
        let (current, connections) = state
            .databases
            .get(name)
            .map(|d| (d.version, d.connections))
            .unwrap_or((0, 0));

        if version < current {
            return Err(EngineError::Version(format!(
                "requested version {} is less than the existing version {}",
                version, current
            )));
        }

        if version > current {
            if connections > 0 {
                return Err(EngineError::Blocked(name.to_string()));
            }

            let mut staged = MemoryUpgrade {
                stores: state
                    .databases
                    .get(name)
                    .map(|d| d.stores.clone())
                    .unwrap_or_default(),
            };
            let tx: &mut dyn SchemaUpgrade = &mut staged;
            upgrade(
                tx,
                VersionChange {
                    old_version: current,
                    new_version: version,
                },
            )?;

            let database = state.databases.entry(name.to_string()).or_default();
            database.version = version;
            database.stores = staged.stores;
            debug!(db = name, from = current, to = version, "memory database upgraded");
        }

        state.opens += 1;
        if let Some(database) = state.databases.get_mut(name) {
            database.connections += 1;
        }

        Ok(MemoryConnection {
            engine: self.clone(),
            name: name.to_string(),
            version,
        })
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        if let Some(database) = state.databases.get(name) {
            if database.connections > 0 {
                return Err(EngineError::Blocked(name.to_string()));
            }
        }
        state.databases.remove(name);
        Ok(())
    }
}

/// Staged schema of a database being upgraded; committed only if the
/// upgrade handler succeeds.
struct MemoryUpgrade {
    stores: BTreeMap<String, MemStore>,
}

impl SchemaUpgrade for MemoryUpgrade {
    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn index_names(&self, store: &str) -> EngineResult<Vec<String>> {
        self.stores
            .get(store)
            .map(|s| s.indexes.iter().map(|i| i.name.clone()).collect())
            .ok_or_else(|| EngineError::UnknownStore(store.to_string()))
    }

    fn create_store(&mut self, name: &str, key_path: &KeyPath) -> EngineResult<()> {
        if self.stores.contains_key(name) {
            return Err(EngineError::Constraint(format!(
                "object store '{}' already exists",
                name
            )));
        }
        self.stores.insert(
            name.to_string(),
            MemStore {
                key_path: key_path.clone(),
                indexes: Vec::new(),
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn create_index(&mut self, store: &str, index: &IndexConfig) -> EngineResult<()> {
        let target = self
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::UnknownStore(store.to_string()))?;
        if target.indexes.iter().any(|i| i.name == index.name) {
            return Err(EngineError::Constraint(format!(
                "index '{}' already exists on '{}'",
                index.name, store
            )));
        }
        target.indexes.push(index.clone());
        Ok(())
    }
}

/// Connection to a [`MemoryEngine`] database. Dropping it closes it.
#[derive(Debug)]
pub struct MemoryConnection {
    engine: MemoryEngine,
    name: String,
    version: u32,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut state = self.engine.state.lock();
        if let Some(database) = state.databases.get_mut(&self.name) {
            database.connections = database.connections.saturating_sub(1);
        }
    }
}

#[async_trait(?Send)]
impl EngineConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.engine.store_names(&self.name)
    }

    async fn put(&self, store: &str, record: Value) -> EngineResult<()> {
        self.engine.take_fault(EngineOp::Put)?;
        self.engine.with_store(&self.name, store, |s| {
            let key = s.key_path.extract(&record).ok_or_else(|| {
                EngineError::Data(format!(
                    "record has no valid key at path '{}'",
                    s.key_path
                ))
            })?;
            s.check_unique(&key, &record)?;
            s.records.insert(key, record);
            Ok(())
        })
    }

    async fn get_all(&self, store: &str) -> EngineResult<Vec<Value>> {
        self.engine.take_fault(EngineOp::GetAll)?;
        self.engine
            .with_store(&self.name, store, |s| Ok(s.records.values().cloned().collect()))
    }

    async fn get(&self, store: &str, key: &Key) -> EngineResult<Option<Value>> {
        self.engine.take_fault(EngineOp::Get)?;
        self.engine
            .with_store(&self.name, store, |s| Ok(s.records.get(key).cloned()))
    }

    async fn delete(&self, store: &str, key: &Key) -> EngineResult<()> {
        self.engine.take_fault(EngineOp::Delete)?;
        self.engine.with_store(&self.name, store, |s| {
            s.records.remove(key);
            Ok(())
        })
    }

    async fn clear(&self, store: &str) -> EngineResult<()> {
        self.engine.take_fault(EngineOp::Clear)?;
        self.engine.with_store(&self.name, store, |s| {
            s.records.clear();
            Ok(())
        })
    }
}

impl MemStore {
    /// Reject `record` if it collides with another record on a unique index.
    fn check_unique(&self, key: &Key, record: &Value) -> EngineResult<()> {
        for index in self.indexes.iter().filter(|i| i.options.unique) {
            let new_keys = index_keys(index, record);
            if new_keys.is_empty() {
                continue;
            }
            let collides = self
                .records
                .iter()
                .filter(|(k, _)| *k != key)
                .any(|(_, other)| index_keys(index, other).iter().any(|k| new_keys.contains(k)));
            if collides {
                return Err(EngineError::Constraint(format!(
                    "unique index '{}' already contains this value",
                    index.name
                )));
            }
        }
        Ok(())
    }
}

/// Keys a record contributes to `index`. Records without a valid value at
/// the index key path are not indexed.
fn index_keys(index: &IndexConfig, record: &Value) -> Vec<Key> {
    let Some(value) = KeyPath::parse(&index.key_path).and_then(|p| p.lookup(record).cloned())
    else {
        return Vec::new();
    };
    match (&value, index.options.multi_entry) {
        (Value::Array(items), true) => {
            let mut keys: Vec<Key> = items.iter().filter_map(Key::from_value).collect();
            keys.sort();
            keys.dedup();
            keys
        }
        _ => Key::from_value(&value).into_iter().collect(),
    }
}
