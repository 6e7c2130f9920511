//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the event-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`. Event handlers
//! are registered through [`Listeners`], which detaches them when the
//! awaiting future is done with the request.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use idbkit_core::engine::{
    EngineError, EngineResult, SchemaUpgrade, UpgradeHandler, VersionChange,
};
use idbkit_core::{IndexConfig, KeyPath};
use js_sys::{Function, Promise};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    DomException, DomStringList, Event, EventTarget, IdbDatabase, IdbFactory, IdbIndexParameters,
    IdbObjectStore, IdbObjectStoreParameters, IdbOpenDbRequest, IdbRequest, IdbTransaction,
    IdbTransactionMode, IdbVersionChangeEvent,
};

use crate::error::{IndexedDbError, Result};

/// Get the global IndexedDB factory.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(IndexedDbError::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Event listeners attached to one target, removed on drop.
pub struct Listeners {
    target: EventTarget,
    handlers: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
}

impl Listeners {
    pub fn new(target: &EventTarget) -> Self {
        Self {
            target: target.clone(),
            handlers: Vec::new(),
        }
    }

    pub fn on(&mut self, event: &'static str, handler: impl FnMut(Event) + 'static) {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        if let Err(e) = self
            .target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            warn!(event, error = ?e, "failed to attach IndexedDB listener");
        }
        self.handlers.push((event, closure));
    }

    /// Keep the handlers attached for the rest of the page's lifetime.
    fn leak(mut self) {
        for (_, closure) in self.handlers.drain(..) {
            closure.forget();
        }
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        for (event, closure) in &self.handlers {
            let _ = self
                .target
                .remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        }
    }
}

fn settle(callback: &Function, value: &JsValue) {
    let _ = callback.call1(&JsValue::UNDEFINED, value);
}

fn request_error(req: &IdbRequest) -> JsValue {
    match req.error() {
        Ok(Some(dom)) => dom.into(),
        _ => JsValue::from_str("unknown IndexedDB request error"),
    }
}

fn transaction_error(tx: &IdbTransaction) -> JsValue {
    if let Some(dom) = tx.error() {
        return dom.into();
    }
    DomException::new_with_message_and_name("transaction aborted", "AbortError")
        .map(JsValue::from)
        .unwrap_or_else(|_| JsValue::from_str("transaction aborted"))
}

/// Promise settled by the request's success or error event.
fn request_promise(req: &IdbRequest, listeners: &mut Listeners) -> Promise {
    Promise::new(&mut |resolve, reject| {
        let r = req.clone();
        listeners.on("success", move |_| {
            settle(&resolve, &r.result().unwrap_or(JsValue::UNDEFINED));
        });
        let r = req.clone();
        listeners.on("error", move |_| settle(&reject, &request_error(&r)));
    })
}

/// Promise settled when the transaction commits or aborts.
fn transaction_promise(tx: &IdbTransaction, listeners: &mut Listeners) -> Promise {
    Promise::new(&mut |resolve, reject| {
        listeners.on("complete", move |_| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
        });
        let t = tx.clone();
        let reject_on_error = reject.clone();
        listeners.on("error", move |_| settle(&reject_on_error, &transaction_error(&t)));
        let t = tx.clone();
        listeners.on("abort", move |_| settle(&reject, &transaction_error(&t)));
    })
}

/// Await an open or delete request.
///
/// A `blocked` event fails the request with [`IndexedDbError::Blocked`].
/// The request itself cannot be cancelled, so its handlers stay attached
/// and a connection that opens later is closed straight away.
async fn await_open_request(
    name: &str,
    req: &IdbOpenDbRequest,
    mut listeners: Listeners,
) -> Result<JsValue> {
    let blocked = Rc::new(Cell::new(false));
    let promise = Promise::new(&mut |resolve, reject| {
        let r = req.clone();
        let flag = blocked.clone();
        listeners.on("success", move |_| {
            let result = r.result().unwrap_or(JsValue::UNDEFINED);
            match result.dyn_ref::<IdbDatabase>() {
                Some(db) if flag.get() => db.close(),
                _ => settle(&resolve, &result),
            }
        });
        let r = req.clone();
        let reject_on_error = reject.clone();
        listeners.on("error", move |_| settle(&reject_on_error, &request_error(&r)));
        let flag = blocked.clone();
        listeners.on("blocked", move |_| {
            flag.set(true);
            settle(&reject, &JsValue::from_str("blocked"));
        });
    });

    let result = JsFuture::from(promise).await;
    if blocked.get() {
        listeners.leak();
        return Err(IndexedDbError::Blocked(name.to_string()));
    }
    drop(listeners);
    result.map_err(IndexedDbError::from)
}

/// Open (or create) `db_name` at `version`, running `upgrade` inside the
/// version-change transaction when one is needed.
///
/// An upgrade failure aborts the version change and is returned as
/// [`IndexedDbError::Upgrade`].
pub async fn open_database(
    db_name: &str,
    version: u32,
    upgrade: UpgradeHandler,
) -> Result<IdbDatabase> {
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = factory
        .open_with_u32(db_name, version)
        .map_err(|e| IndexedDbError::Open(format!("{:?}", e)))?;

    let failure: Rc<RefCell<Option<EngineError>>> = Rc::new(RefCell::new(None));
    let mut listeners = Listeners::new(&open_req);

    let req = open_req.clone();
    let upgrade_failure = failure.clone();
    listeners.on("upgradeneeded", move |event: Event| {
        let event: &IdbVersionChangeEvent = event.unchecked_ref();
        let change = VersionChange {
            old_version: event.old_version() as u32,
            new_version: event.new_version().map_or(version, |v| v as u32),
        };
        debug!(
            old_version = change.old_version,
            new_version = change.new_version,
            "running IndexedDB upgrade"
        );
        if let Err(e) = run_upgrade(&req, &upgrade, change) {
            warn!(error = %e, "IndexedDB upgrade failed, aborting version change");
            if let Some(tx) = req.transaction() {
                let _ = tx.abort();
            }
            *upgrade_failure.borrow_mut() = Some(e);
        }
    });

    let result = await_open_request(db_name, &open_req, listeners).await;
    if let Some(err) = failure.borrow_mut().take() {
        return Err(IndexedDbError::Upgrade(err));
    }

    result?
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::Open("result is not IdbDatabase".into()))
}

fn run_upgrade(
    req: &IdbOpenDbRequest,
    upgrade: &UpgradeHandler,
    change: VersionChange,
) -> EngineResult<()> {
    let db: IdbDatabase = req
        .result()
        .map_err(|e| EngineError::from(IndexedDbError::js("upgrade result", &e)))?
        .unchecked_into();
    let tx = req
        .transaction()
        .ok_or_else(|| EngineError::Backend("no version-change transaction".into()))?;

    let mut schema = IdbSchema { db, tx };
    let schema: &mut dyn SchemaUpgrade = &mut schema;
    upgrade(schema, change)
}

/// Schema access during `upgradeneeded`.
struct IdbSchema {
    db: IdbDatabase,
    tx: IdbTransaction,
}

impl IdbSchema {
    fn existing_store(&self, store: &str) -> EngineResult<IdbObjectStore> {
        self.tx
            .object_store(store)
            .map_err(|e| EngineError::from(IndexedDbError::from(e)))
    }
}

impl SchemaUpgrade for IdbSchema {
    fn store_names(&self) -> Vec<String> {
        string_list(&self.db.object_store_names())
    }

    fn index_names(&self, store: &str) -> EngineResult<Vec<String>> {
        Ok(string_list(&self.existing_store(store)?.index_names()))
    }

    fn create_store(&mut self, name: &str, key_path: &KeyPath) -> EngineResult<()> {
        let params = IdbObjectStoreParameters::new();
        js_sys::Reflect::set(&params, &"keyPath".into(), &key_path.as_str().into())
            .map_err(|e| EngineError::from(IndexedDbError::js("set keyPath", &e)))?;

        self.db
            .create_object_store_with_optional_parameters(name, &params)
            .map_err(|e| EngineError::from(IndexedDbError::from(e)))?;
        Ok(())
    }

    fn create_index(&mut self, store: &str, index: &IndexConfig) -> EngineResult<()> {
        let params = IdbIndexParameters::new();
        for (prop, flag) in [
            ("unique", index.options.unique),
            ("multiEntry", index.options.multi_entry),
        ] {
            js_sys::Reflect::set(&params, &prop.into(), &JsValue::from_bool(flag))
                .map_err(|e| EngineError::from(IndexedDbError::js(prop, &e)))?;
        }

        self.existing_store(store)?
            .create_index_with_str_and_optional_parameters(&index.name, &index.key_path, &params)
            .map_err(|e| EngineError::from(IndexedDbError::from(e)))?;
        Ok(())
    }
}

pub fn string_list(list: &DomStringList) -> Vec<String> {
    (0..list.length()).filter_map(|i| list.item(i)).collect()
}

/// Start a single-store transaction.
pub fn begin_transaction(
    db: &IdbDatabase,
    store: &str,
    mode: IdbTransactionMode,
) -> Result<(IdbTransaction, IdbObjectStore)> {
    let tx = db
        .transaction_with_str_and_mode(store, mode)
        .map_err(IndexedDbError::from)?;
    let object_store = tx.object_store(store).map_err(IndexedDbError::from)?;
    Ok((tx, object_store))
}

/// Await `req`, then the commit of the transaction it belongs to.
///
/// Both promises are created before the first await so the transaction's
/// `complete` event cannot be missed.
pub async fn await_committed(tx: &IdbTransaction, req: &IdbRequest) -> Result<JsValue> {
    let mut tx_listeners = Listeners::new(tx);
    let committed = JsFuture::from(transaction_promise(tx, &mut tx_listeners));

    let mut req_listeners = Listeners::new(req);
    let result = JsFuture::from(request_promise(req, &mut req_listeners))
        .await
        .map_err(IndexedDbError::from)?;

    committed.await.map_err(IndexedDbError::from)?;
    Ok(result)
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(db_name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory
        .delete_database(db_name)
        .map_err(|e| IndexedDbError::Open(format!("delete db: {:?}", e)))?;
    let listeners = Listeners::new(&req);
    await_open_request(db_name, &req, listeners).await?;
    Ok(())
}
