//! Storage engine trait definitions

use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::IndexConfig;
use crate::engine::error::EngineResult;
use crate::key::{Key, KeyPath};

/// Old and new version numbers of a version-change (upgrade) event.
///
/// `old_version` is 0 when the database is being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    pub old_version: u32,
    pub new_version: u32,
}

/// Schema operations available while a version change is in progress.
pub trait SchemaUpgrade {
    /// Names of the stores currently present in the database.
    fn store_names(&self) -> Vec<String>;

    /// Names of the indexes currently present on `store`.
    fn index_names(&self, store: &str) -> EngineResult<Vec<String>>;

    /// Create a store whose records are keyed by `key_path`.
    fn create_store(&mut self, name: &str, key_path: &KeyPath) -> EngineResult<()>;

    /// Create a secondary index on an existing store.
    fn create_index(&mut self, store: &str, index: &IndexConfig) -> EngineResult<()>;
}

/// Callback run by the engine inside the version-change transaction.
///
/// Returning an error aborts the upgrade; the open then fails and no
/// schema change is kept.
pub type UpgradeHandler = Rc<dyn Fn(&mut dyn SchemaUpgrade, VersionChange) -> EngineResult<()>>;

/// Access point to a transactional, versioned object store engine.
///
/// Implementations exist for:
/// - **Memory**: process-local fake for tests and native tools (`MemoryEngine`)
/// - **IndexedDB**: browser storage via web-sys (`idbkit-indexeddb`, WASM only)
#[async_trait(?Send)]
pub trait StorageEngine {
    type Connection: EngineConnection;

    /// Open (or create) database `name` at `version`.
    ///
    /// `upgrade` runs when the database is created or `version` is higher
    /// than the stored version.
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHandler,
    ) -> EngineResult<Self::Connection>;

    /// Delete database `name` and everything in it.
    async fn delete_database(&self, name: &str) -> EngineResult<()>;
}

/// A live connection to one opened database.
///
/// Every data operation runs in its own single-store transaction.
#[async_trait(?Send)]
pub trait EngineConnection {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the database was opened at.
    fn version(&self) -> u32;

    /// Names of the stores present in the database.
    fn store_names(&self) -> Vec<String>;

    /// Insert or replace a record (read-write transaction).
    async fn put(&self, store: &str, record: Value) -> EngineResult<()>;

    /// All records in key order (read-only transaction).
    async fn get_all(&self, store: &str) -> EngineResult<Vec<Value>>;

    /// The record stored under `key`, if any (read-only transaction).
    async fn get(&self, store: &str, key: &Key) -> EngineResult<Option<Value>>;

    /// Remove the record stored under `key`. Succeeds if there is none.
    async fn delete(&self, store: &str, key: &Key) -> EngineResult<()>;

    /// Remove every record in `store`.
    async fn clear(&self, store: &str) -> EngineResult<()>;
}
