//! Store manager: CRUD over one target store of a lazily opened database.
//!
//! Each operation ensures the connection exists, then runs exactly one
//! single-store transaction through the injected [`StorageEngine`].

use std::marker::PhantomData;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{DbConfig, ResolvedConfig, StoreConfig};
use crate::engine::{
    EngineConnection, EngineError, EngineResult, SchemaUpgrade, StorageEngine, UpgradeHandler,
    VersionChange,
};
use crate::error::{Error, Result};
use crate::key::{Key, KeyPath};

/// CRUD facade over the target store of one database.
///
/// The connection is opened on first use. Concurrent first calls share a
/// single in-flight open; if it fails, the next call tries again.
pub struct StoreManager<T, E: StorageEngine> {
    engine: E,
    config: ResolvedConfig,
    connection: OnceCell<E::Connection>,
    _record: PhantomData<fn() -> T>,
}

impl<T, E> StoreManager<T, E>
where
    T: Serialize + DeserializeOwned,
    E: StorageEngine,
{
    /// Create a manager for `config` on `engine`.
    ///
    /// Fails with [`Error::Configuration`] before any I/O if the
    /// configuration is invalid, e.g. several stores and no target store.
    pub fn new(config: DbConfig, engine: E) -> Result<Self> {
        Ok(Self::from_resolved(config.resolve()?, engine))
    }

    /// Create a manager from an already validated configuration.
    pub fn from_resolved(config: ResolvedConfig, engine: E) -> Self {
        Self {
            engine,
            config,
            connection: OnceCell::new(),
            _record: PhantomData,
        }
    }

    pub fn db_name(&self) -> &str {
        self.config.db_name()
    }

    pub fn version(&self) -> u32 {
        self.config.version()
    }

    /// Name of the store operations run against.
    pub fn store_name(&self) -> &str {
        self.config.store_name()
    }

    /// Key path of the target store.
    pub fn key_path(&self) -> &KeyPath {
        self.config.key_path()
    }

    /// Whether the connection has been opened.
    pub fn is_open(&self) -> bool {
        self.connection.initialized()
    }

    /// The key of `record` in the target store, if it has a valid one.
    pub fn key_of(&self, record: &T) -> Result<Option<Key>> {
        let value = serde_json::to_value(record)?;
        Ok(self.key_path().extract(&value))
    }

    /// Open the database, creating or upgrading its schema as needed.
    ///
    /// Returns immediately once a connection exists.
    pub async fn open(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Insert or replace `record` in the target store.
    pub async fn put(&self, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        let conn = self.connection().await?;
        debug!(store = self.store_name(), "put");
        conn.put(self.store_name(), value)
            .await
            .map_err(Error::Write)
    }

    /// Every record in the target store, in key order.
    pub async fn get_all(&self) -> Result<Vec<T>> {
        let conn = self.connection().await?;
        debug!(store = self.store_name(), "get_all");
        let values = conn
            .get_all(self.store_name())
            .await
            .map_err(Error::Read)?;
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    /// The record stored under `key`, or `None`.
    pub async fn get_by_id(&self, key: impl Into<Key>) -> Result<Option<T>> {
        let key = key.into();
        let conn = self.connection().await?;
        debug!(store = self.store_name(), %key, "get");
        let value = conn
            .get(self.store_name(), &key)
            .await
            .map_err(Error::Read)?;
        value
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .transpose()
    }

    /// Delete the record stored under `key`. Succeeds if there is none.
    pub async fn delete_by_id(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let conn = self.connection().await?;
        debug!(store = self.store_name(), %key, "delete");
        conn.delete(self.store_name(), &key)
            .await
            .map_err(Error::Write)
    }

    /// Delete every record in the target store.
    pub async fn clear_all(&self) -> Result<()> {
        let conn = self.connection().await?;
        debug!(store = self.store_name(), "clear");
        conn.clear(self.store_name()).await.map_err(Error::Write)
    }

    async fn connection(&self) -> Result<&E::Connection> {
        self.connection
            .get_or_try_init(|| self.open_connection())
            .await
    }

    async fn open_connection(&self) -> Result<E::Connection> {
        let name = self.db_name();
        let version = self.version();
        info!(db = name, version, "opening database");

        let handler = schema_upgrade(self.config.stores().to_vec());
        let conn = self
            .engine
            .open(name, version, handler)
            .await
            .map_err(|e| {
                warn!(db = name, version, error = %e, "failed to open database");
                Error::Connection(e)
            })?;

        if !conn.store_names().iter().any(|s| s == self.store_name()) {
            return Err(Error::Connection(EngineError::UnknownStore(
                self.store_name().to_string(),
            )));
        }
        Ok(conn)
    }
}

/// Upgrade handler that creates every configured store and index missing
/// from the database. Existing stores and indexes are left untouched.
pub(crate) fn schema_upgrade(stores: Vec<StoreConfig>) -> UpgradeHandler {
    Rc::new(
        move |tx: &mut dyn SchemaUpgrade, change: VersionChange| -> EngineResult<()> {
            info!(
                from = change.old_version,
                to = change.new_version,
                "upgrading database schema"
            );
            let existing = tx.store_names();

            for store in &stores {
                let present = if existing.contains(&store.name) {
                    tx.index_names(&store.name)?
                } else {
                    let key_path = store
                        .effective_key_path()
                        .map_err(|e| EngineError::Data(e.to_string()))?;
                    tx.create_store(&store.name, &key_path)?;
                    info!(store = %store.name, key_path = %key_path, "created store");
                    Vec::new()
                };

                for index in store.indexes.iter().filter(|i| !present.contains(&i.name)) {
                    tx.create_index(&store.name, index)?;
                    debug!(store = %store.name, index = %index.name, "created index");
                }
            }
            Ok(())
        },
    )
}

/// Shallow-merge the fields of `changes` onto `record`.
///
/// Both must be JSON objects; fields in `changes` overwrite, all others are
/// retained.
pub(crate) fn merge_fields(record: Value, changes: Value) -> Result<Value> {
    match (record, changes) {
        (Value::Object(mut base), Value::Object(changes)) => {
            base.extend(changes);
            Ok(Value::Object(base))
        }
        (_, Value::Object(_)) => Err(Error::Serialization(
            "stored record is not an object".to_string(),
        )),
        _ => Err(Error::Serialization(
            "changes must serialize to an object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_and_retains() {
        let merged = merge_fields(
            json!({"id": "a", "text": "x", "done": false}),
            json!({"done": true}),
        )
        .unwrap();
        assert_eq!(merged, json!({"id": "a", "text": "x", "done": true}));
    }

    #[test]
    fn test_merge_is_shallow() {
        let merged = merge_fields(
            json!({"id": "a", "meta": {"x": 1, "y": 2}}),
            json!({"meta": {"x": 3}}),
        )
        .unwrap();
        assert_eq!(merged, json!({"id": "a", "meta": {"x": 3}}));
    }

    #[test]
    fn test_merge_rejects_non_objects() {
        assert!(merge_fields(json!({"id": "a"}), json!(5)).is_err());
        assert!(merge_fields(json!([1]), json!({"a": 1})).is_err());
    }
}
