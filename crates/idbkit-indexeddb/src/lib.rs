//! IndexedDB storage engine for idbkit (browser WASM)
//!
//! Implements the `idbkit-core` engine traits over `web-sys`, so a
//! `StoreManager` or `Binding` can persist records in the browser.
//!
//! Each data operation runs in its own single-store transaction and resolves
//! only after that transaction commits. Version upgrades run the manager's
//! schema handler inside the native `upgradeneeded` event; a handler error
//! aborts the version change.
//!
//! # Example
//!
//! ```rust,ignore
//! use idbkit_core::{Binding, DbConfig, StoreConfig};
//! use idbkit_indexeddb::IndexedDbEngine;
//! use serde_json::{json, Value};
//!
//! let config = DbConfig::new("TodoDemoDB").store(StoreConfig::new("todos"));
//! let todos: Binding<Value, _> = Binding::open(config, IndexedDbEngine::new()).await?;
//!
//! todos.save(&json!({"id": "a", "text": "x", "done": false})).await?;
//! assert_eq!(todos.data().len(), 1);
//! ```

pub mod engine;
pub mod error;
pub mod idb;

pub use engine::{IndexedDbConnection, IndexedDbEngine};
pub use error::{IndexedDbError, Result};
