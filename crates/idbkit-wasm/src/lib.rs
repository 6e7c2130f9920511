//! Browser WASM bindings for idbkit
//!
//! Exposes an IndexedDB-backed [`Binding`] to JavaScript as the `IdbBinding`
//! class. Records cross the boundary as JSON strings; operations return
//! promises.
//!
//! ```js
//! import init, { IdbBinding } from "idbkit-wasm";
//!
//! await init();
//! const todos = new IdbBinding(JSON.stringify({
//!   dbName: "TodoDemoDB",
//!   stores: [{ name: "todos", keyPath: "id" }],
//! }));
//! todos.onChange(() => render(JSON.parse(todos.data), todos.isLoading, todos.error));
//! await todos.save(JSON.stringify({ id: "a", text: "x", done: false }));
//! await todos.update("a", JSON.stringify({ done: true }));
//! ```

use std::fmt::Display;
use std::rc::Rc;

use idbkit_core::engine::StorageEngine;
use idbkit_core::{Binding, DbConfig, Key};
use idbkit_indexeddb::IndexedDbEngine;
use js_sys::{Array, Function, Promise};
use serde_json::Value;
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

type JsResult<T> = Result<T, JsValue>;

fn to_js(err: impl Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn parse_json(text: &str) -> JsResult<Value> {
    serde_json::from_str(text).map_err(to_js)
}

/// Convert a JS key (number, string or array of keys) into a [`Key`].
fn js_to_key(val: &JsValue) -> JsResult<Key> {
    if let Some(n) = val.as_f64() {
        return Ok(Key::from(n));
    }
    if let Some(s) = val.as_string() {
        return Ok(Key::from(s));
    }
    if Array::is_array(val) {
        let items = Array::from(val)
            .iter()
            .map(|v| js_to_key(&v))
            .collect::<JsResult<Vec<_>>>()?;
        return Ok(Key::from(items));
    }
    Err(to_js("key must be a number, a string or an array of keys"))
}

/// Reactive view of one IndexedDB object store.
#[wasm_bindgen]
pub struct IdbBinding {
    inner: Rc<Binding<Value, IndexedDbEngine>>,
}

#[wasm_bindgen]
impl IdbBinding {
    /// Create a binding from a JSON database configuration and start its
    /// initial load. Throws on an invalid configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> JsResult<IdbBinding> {
        // Route Rust panics to console.error instead of "RuntimeError: unreachable"
        console_error_panic_hook::set_once();

        let config = DbConfig::from_json(config_json).map_err(to_js)?;
        let inner = Rc::new(Binding::new(config, IndexedDbEngine::new()).map_err(to_js)?);
        debug!(store = inner.store_name(), "IdbBinding created");

        let init = inner.clone();
        spawn_local(async move { init.initialize().await });
        Ok(Self { inner })
    }

    /// Current records as a JSON array string.
    #[wasm_bindgen(getter)]
    pub fn data(&self) -> JsResult<String> {
        serde_json::to_string(&self.inner.data()).map_err(to_js)
    }

    #[wasm_bindgen(getter, js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.inner.is_loading()
    }

    #[wasm_bindgen(getter)]
    pub fn error(&self) -> Option<String> {
        self.inner.error()
    }

    /// Call `callback` after every snapshot change, for as long as the
    /// binding lives.
    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&self, callback: Function) {
        let mut rx = self.inner.subscribe();
        spawn_local(async move {
            while rx.changed().await.is_ok() {
                if let Err(e) = callback.call0(&JsValue::NULL) {
                    web_sys::console::error_1(&e);
                }
            }
        });
    }

    /// Resolves once the initial load has finished.
    pub fn ready(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.initialize().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Insert or replace a record given as JSON.
    pub fn save(&self, record_json: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let record = parse_json(&record_json)?;
            inner.save(&record).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Merge the JSON object `changes_json` into the record stored under `id`.
    pub fn update(&self, id: JsValue, changes_json: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let key = js_to_key(&id)?;
            let changes = parse_json(&changes_json)?;
            inner.update(key, changes).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn remove(&self, id: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let key = js_to_key(&id)?;
            inner.remove(key).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Resolves with the record's JSON, or `null` when it is absent or the
    /// lookup failed.
    #[wasm_bindgen(js_name = findById)]
    pub fn find_by_id(&self, id: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let key = js_to_key(&id)?;
            match inner.find_by_id(key).await {
                Some(record) => Ok(JsValue::from(
                    serde_json::to_string(&record).map_err(to_js)?,
                )),
                None => Ok(JsValue::NULL),
            }
        })
    }

    pub fn clear(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.clear().await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Reload every record. Never rejects; failures land in `error`.
    pub fn refresh(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.refresh().await;
            Ok(JsValue::UNDEFINED)
        })
    }
}

/// Delete an IndexedDB database by name.
#[wasm_bindgen(js_name = deleteDatabase)]
pub async fn delete_database(name: String) -> JsResult<()> {
    IndexedDbEngine::new()
        .delete_database(&name)
        .await
        .map_err(to_js)
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_futures::JsFuture;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    /// Let spawned change listeners run.
    async fn settle() {
        for _ in 0..3 {
            JsFuture::from(Promise::resolve(&JsValue::UNDEFINED))
                .await
                .unwrap();
        }
    }

    fn change_count() -> f64 {
        js_sys::Reflect::get(&js_sys::global(), &"__idbkitChanges".into())
            .unwrap()
            .as_f64()
            .unwrap_or(0.0)
    }

    #[wasm_bindgen_test]
    fn test_js_keys() {
        assert_eq!(js_to_key(&JsValue::from_str("a")).unwrap(), Key::from("a"));
        assert_eq!(js_to_key(&JsValue::from_f64(7.0)).unwrap(), Key::from(7));

        let pair: Array = [JsValue::from_str("u"), JsValue::from_f64(1.0)]
            .iter()
            .collect();
        assert_eq!(
            js_to_key(&pair.into()).unwrap(),
            Key::from(vec![Key::from("u"), Key::from(1)])
        );

        assert!(js_to_key(&JsValue::TRUE).is_err());
    }

    #[wasm_bindgen_test]
    async fn test_throwing_listener_keeps_receiving_changes() {
        delete_database("idbkit-wasm-listener".into()).await.unwrap();
        let binding = IdbBinding::new(
            r#"{"dbName": "idbkit-wasm-listener", "stores": [{"name": "todos", "keyPath": "id"}]}"#,
        )
        .unwrap();
        JsFuture::from(binding.ready()).await.unwrap();

        binding.on_change(Function::new_no_args(
            "globalThis.__idbkitChanges = (globalThis.__idbkitChanges || 0) + 1; \
             throw new Error('listener failed');",
        ));

        JsFuture::from(binding.save(r#"{"id": "a"}"#.into()))
            .await
            .unwrap();
        settle().await;
        let after_save = change_count();
        assert!(after_save >= 1.0);

        JsFuture::from(binding.clear()).await.unwrap();
        settle().await;
        assert!(change_count() > after_save);
        assert_eq!(binding.data().unwrap(), "[]");
    }
}
