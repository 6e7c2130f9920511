//! IndexedDB implementation of the idbkit storage engine traits.
//!
//! Records cross the JS boundary as JSON text (`JSON.parse` /
//! `JSON.stringify`), so whatever `serde_json` can represent is stored as a
//! plain structured-clone object and read back unchanged.

use async_trait::async_trait;
use idbkit_core::engine::{EngineConnection, EngineResult, StorageEngine, UpgradeHandler};
use idbkit_core::Key;
use serde_json::Value;
use tracing::{debug, info};
use wasm_bindgen::prelude::*;
use web_sys::{IdbDatabase, IdbObjectStore, IdbRequest, IdbTransactionMode};

use crate::error::{IndexedDbError, Result};
use crate::idb;

/// Storage engine backed by the browser's `indexedDB` factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedDbEngine;

impl IndexedDbEngine {
    pub fn new() -> Self {
        Self
    }

    /// Whether `indexedDB` exists on the global object.
    pub fn is_available() -> bool {
        idb::idb_factory().is_ok()
    }
}

#[async_trait(?Send)]
impl StorageEngine for IndexedDbEngine {
    type Connection = IndexedDbConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHandler,
    ) -> EngineResult<IndexedDbConnection> {
        let db = idb::open_database(name, version, upgrade).await?;
        info!(db = name, version = db.version(), "IndexedDB connection open");
        Ok(IndexedDbConnection {
            name: db.name(),
            db,
        })
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        idb::delete_database(name).await?;
        debug!(db = name, "IndexedDB database deleted");
        Ok(())
    }
}

/// An open IndexedDB database.
///
/// The connection stays open for as long as this value lives and is closed
/// on drop, so a dropped manager never blocks a later upgrade or delete.
pub struct IndexedDbConnection {
    db: IdbDatabase,
    name: String,
}

impl Drop for IndexedDbConnection {
    fn drop(&mut self) {
        self.db.close();
    }
}

impl IndexedDbConnection {
    async fn run(
        &self,
        store: &str,
        mode: IdbTransactionMode,
        request: impl FnOnce(&IdbObjectStore) -> std::result::Result<IdbRequest, JsValue>,
    ) -> Result<JsValue> {
        let (tx, object_store) = idb::begin_transaction(&self.db, store, mode)?;
        let req = request(&object_store).map_err(IndexedDbError::from)?;
        idb::await_committed(&tx, &req).await
    }
}

#[async_trait(?Send)]
impl EngineConnection for IndexedDbConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.db.version() as u32
    }

    fn store_names(&self) -> Vec<String> {
        idb::string_list(&self.db.object_store_names())
    }

    async fn put(&self, store: &str, record: Value) -> EngineResult<()> {
        let js_val = record_to_js(&record)?;
        self.run(store, IdbTransactionMode::Readwrite, |s| s.put(&js_val))
            .await?;
        Ok(())
    }

    async fn get_all(&self, store: &str) -> EngineResult<Vec<Value>> {
        let result = self
            .run(store, IdbTransactionMode::Readonly, |s| s.get_all())
            .await?;
        let records = js_sys::Array::from(&result)
            .iter()
            .map(|v| js_to_record(&v))
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn get(&self, store: &str, key: &Key) -> EngineResult<Option<Value>> {
        let js_key = key_to_js(key);
        let result = self
            .run(store, IdbTransactionMode::Readonly, |s| s.get(&js_key))
            .await?;

        if result.is_undefined() || result.is_null() {
            return Ok(None);
        }
        Ok(Some(js_to_record(&result)?))
    }

    async fn delete(&self, store: &str, key: &Key) -> EngineResult<()> {
        let js_key = key_to_js(key);
        self.run(store, IdbTransactionMode::Readwrite, |s| s.delete(&js_key))
            .await?;
        Ok(())
    }

    async fn clear(&self, store: &str) -> EngineResult<()> {
        self.run(store, IdbTransactionMode::Readwrite, |s| s.clear())
            .await?;
        Ok(())
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::String(s) => JsValue::from_str(s),
        Key::Array(items) => items.iter().map(key_to_js).collect::<js_sys::Array>().into(),
    }
}

fn record_to_js(record: &Value) -> Result<JsValue> {
    let text = serde_json::to_string(record)?;
    js_sys::JSON::parse(&text).map_err(|e| IndexedDbError::js("JSON.parse", &e))
}

fn js_to_record(val: &JsValue) -> Result<Value> {
    let text: String = js_sys::JSON::stringify(val)
        .map_err(|e| IndexedDbError::js("JSON.stringify", &e))?
        .into();
    Ok(serde_json::from_str(&text)?)
}
