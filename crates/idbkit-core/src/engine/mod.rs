//! Storage engine abstraction
//!
//! The store manager never touches a global storage API directly; it is
//! handed a [`StorageEngine`] at construction. Implementations exist for:
//!
//! - **Memory**: process-local engine for tests and native tools (`MemoryEngine`)
//! - **IndexedDB**: browser storage via web-sys (`idbkit-indexeddb` crate, WASM only)
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use idbkit_core::engine::{EngineConnection, MemoryEngine, SchemaUpgrade, StorageEngine, UpgradeHandler, VersionChange};
//! use idbkit_core::KeyPath;
//!
//! # tokio_test_block_on(async {
//! let engine = MemoryEngine::new();
//! let upgrade: UpgradeHandler = Rc::new(|tx: &mut dyn SchemaUpgrade, _: VersionChange| {
//!     tx.create_store("todos", &KeyPath::default())
//! });
//!
//! let conn = engine.open("TodoDB", 1, upgrade).await.unwrap();
//! conn.put("todos", serde_json::json!({"id": "a", "text": "x"})).await.unwrap();
//! assert_eq!(conn.get_all("todos").await.unwrap().len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod error;
mod memory;
mod traits;

pub use error::{EngineError, EngineResult};
pub use memory::{EngineOp, MemoryConnection, MemoryEngine};
pub use traits::{EngineConnection, SchemaUpgrade, StorageEngine, UpgradeHandler, VersionChange};
