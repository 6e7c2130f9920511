//! Reactive binding over a store manager
//!
//! A [`Binding`] owns a private [`StoreManager`] and an observable
//! [`Snapshot`] of the target store. Every operation runs one manager call
//! and then reconciles the snapshot: a full reload after writes that may be
//! normalized by the store, an in-place patch after deletes and clears.
//! Failed operations record their error and leave the records untouched.
//!
//! # Example
//!
//! ```rust
//! use idbkit_core::{Binding, DbConfig, MemoryEngine, StoreConfig};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Todo {
//!     id: String,
//!     text: String,
//!     done: bool,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let config = DbConfig::new("TodoDemoDB").store(StoreConfig::new("todos"));
//! let todos: Binding<Todo, _> = Binding::open(config, MemoryEngine::new()).await.unwrap();
//!
//! todos
//!     .save(&Todo { id: "a".into(), text: "x".into(), done: false })
//!     .await
//!     .unwrap();
//! todos.update("a", json!({ "done": true })).await.unwrap();
//! assert!(todos.data()[0].done);
//! # });
//! ```

mod snapshot;

pub use snapshot::{Snapshot, Status};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tracing::warn;

use crate::config::{DbConfig, ResolvedConfig};
use crate::engine::StorageEngine;
use crate::error::{Error, Result};
use crate::key::{Key, KeyPath};
use crate::manager::{merge_fields, StoreManager};

/// Observable, self-reconciling view of one store.
pub struct Binding<T, E: StorageEngine> {
    manager: StoreManager<T, E>,
    state: watch::Sender<Snapshot<T>>,
    initialized: OnceCell<()>,
}

impl<T, E> Binding<T, E>
where
    T: Serialize + DeserializeOwned + Clone,
    E: StorageEngine,
{
    /// Create a binding with an initial loading snapshot.
    ///
    /// Fails with [`Error::Configuration`] before any I/O. The initial load
    /// runs on [`Binding::initialize`].
    pub fn new(config: DbConfig, engine: E) -> Result<Self> {
        Ok(Self::from_resolved(config.resolve()?, engine))
    }

    pub fn from_resolved(config: ResolvedConfig, engine: E) -> Self {
        let (state, _) = watch::channel(Snapshot::new());
        Self {
            manager: StoreManager::from_resolved(config, engine),
            state,
            initialized: OnceCell::new(),
        }
    }

    /// Create a binding and wait for its initial load.
    pub async fn open(config: DbConfig, engine: E) -> Result<Self> {
        let binding = Self::new(config, engine)?;
        binding.initialize().await;
        Ok(binding)
    }

    /// Run the initial full load. Only the first call loads; later and
    /// concurrent calls wait for that load to settle. A no-op once any
    /// [`Binding::refresh`] has settled.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                self.apply(Snapshot::begin_load);
                self.load().await;
            })
            .await;
    }

    pub fn store_name(&self) -> &str {
        self.manager.store_name()
    }

    pub fn key_path(&self) -> &KeyPath {
        self.manager.key_path()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.state.borrow().clone()
    }

    /// Records currently in the snapshot.
    pub fn data(&self) -> Vec<T> {
        self.state.borrow().data().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Error of the most recent operation, if it failed.
    pub fn error(&self) -> Option<String> {
        self.state.borrow().error().map(str::to_string)
    }

    /// Reload every record from the store.
    ///
    /// Failures are recorded in the snapshot, never returned; the previous
    /// records are kept.
    pub async fn refresh(&self) {
        self.apply(Snapshot::begin_load);
        self.load().await;
        // The snapshot now reflects a full load; skip a later initial one
        let _ = self.initialized.set(());
    }

    /// Insert or replace `record`, then reload.
    pub async fn save(&self, record: &T) -> Result<()> {
        self.apply(Snapshot::begin_op);
        if let Err(e) = self.manager.put(record).await {
            return Err(self.fail("save", e));
        }
        self.refresh().await;
        Ok(())
    }

    /// Merge `changes` onto the record stored under `key`, then reload.
    ///
    /// `changes` must serialize to a JSON object; its fields overwrite the
    /// stored ones and every other field is kept. Does nothing if no record
    /// is stored under `key`.
    pub async fn update(&self, key: impl Into<Key>, changes: impl Serialize) -> Result<()> {
        let key = key.into();
        self.apply(Snapshot::begin_op);
        match self.merge_and_put(key, changes).await {
            Ok(true) => {
                self.refresh().await;
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.fail("update", e)),
        }
    }

    /// Delete the record stored under `key` and drop it from the snapshot
    /// without reloading.
    pub async fn remove(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.apply(Snapshot::begin_op);
        if let Err(e) = self.manager.delete_by_id(key.clone()).await {
            return Err(self.fail("remove", e));
        }
        self.apply(|s| {
            s.removed(|record| self.manager.key_of(record).ok().flatten().as_ref() == Some(&key))
        });
        Ok(())
    }

    /// Look up the record stored under `key` without touching the snapshot.
    ///
    /// Failures are recorded in the snapshot and reported as `None`.
    pub async fn find_by_id(&self, key: impl Into<Key>) -> Option<T> {
        self.apply(Snapshot::begin_op);
        match self.manager.get_by_id(key).await {
            Ok(record) => record,
            Err(e) => {
                self.fail("find_by_id", e);
                None
            }
        }
    }

    /// Delete every record and empty the snapshot.
    pub async fn clear(&self) -> Result<()> {
        self.apply(Snapshot::begin_op);
        if let Err(e) = self.manager.clear_all().await {
            return Err(self.fail("clear", e));
        }
        self.apply(Snapshot::cleared);
        Ok(())
    }

    /// Returns whether a record was found and written.
    async fn merge_and_put(&self, key: Key, changes: impl Serialize) -> Result<bool> {
        let Some(existing) = self.manager.get_by_id(key).await? else {
            return Ok(false);
        };
        let merged = merge_fields(
            serde_json::to_value(&existing)?,
            serde_json::to_value(changes)?,
        )?;
        let record: T = serde_json::from_value(merged)?;
        self.manager.put(&record).await?;
        Ok(true)
    }

    async fn load(&self) {
        match self.manager.get_all().await {
            Ok(records) => self.apply(|s| s.loaded(records)),
            Err(e) => {
                warn!(store = self.store_name(), error = %e, "failed to load records");
                self.apply(|s| s.load_failed(e.to_string()));
            }
        }
    }

    fn fail(&self, op: &'static str, err: Error) -> Error {
        warn!(store = self.store_name(), op, error = %err, "operation failed");
        self.apply(|s| s.op_failed(err.to_string()));
        err
    }

    fn apply(&self, transition: impl FnOnce(Snapshot<T>) -> Snapshot<T>) {
        self.state.send_modify(|s| {
            let current = std::mem::take(s);
            *s = transition(current);
        });
    }
}
