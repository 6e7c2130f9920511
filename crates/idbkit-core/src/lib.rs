//! idbkit core
//!
//! A future-based CRUD facade over a transactional, schema-versioned object
//! store, plus a reactive binding that keeps an in-memory snapshot in sync
//! with the store. Designed to run identically in the browser (WASM, over
//! IndexedDB) and natively (over the in-memory engine).
//!
//! - [`StoreManager`]: owns one lazily opened connection, creates missing
//!   stores and indexes on version upgrade, and maps `put`, `get_all`,
//!   `get_by_id`, `delete_by_id` and `clear_all` onto single-store
//!   transactions.
//! - [`Binding`]: wraps a private manager and exposes an observable
//!   [`Snapshot`] (records, loading flag, error) with `save`, `update`,
//!   `remove`, `find_by_id`, `clear` and `refresh`.
//! - [`engine`]: the injected storage engine seam and [`MemoryEngine`].
//!
//! # Example
//!
//! ```rust
//! use idbkit_core::{DbConfig, MemoryEngine, StoreConfig, StoreManager};
//! use serde_json::{json, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let config = DbConfig::new("T").store(StoreConfig::new("todos"));
//! let manager: StoreManager<Value, _> = StoreManager::new(config, MemoryEngine::new()).unwrap();
//!
//! manager.put(&json!({"id": "a", "text": "x"})).await.unwrap();
//! let found = manager.get_by_id("a").await.unwrap();
//! assert_eq!(found, Some(json!({"id": "a", "text": "x"})));
//! # });
//! ```

pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod manager;

// Re-export main types at crate root
pub use binding::{Binding, Snapshot, Status};
pub use config::{DbConfig, IndexConfig, IndexOptions, ResolvedConfig, StoreConfig};
pub use engine::{EngineError, MemoryEngine, StorageEngine};
pub use error::{Error, Result};
pub use key::{Key, KeyPath};
pub use manager::StoreManager;
