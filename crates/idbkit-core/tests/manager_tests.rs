//! StoreManager tests against the in-memory engine

use idbkit_core::engine::EngineOp;
use idbkit_core::{
    DbConfig, EngineError, Error, IndexConfig, MemoryEngine, StoreConfig, StoreManager,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    id: String,
    text: String,
    done: bool,
}

fn todo(id: &str, text: &str) -> Todo {
    Todo {
        id: id.to_string(),
        text: text.to_string(),
        done: false,
    }
}

fn todos_config() -> DbConfig {
    DbConfig::new("T").store(
        StoreConfig::new("todos")
            .key_path("id")
            .index(IndexConfig::new("by_done", "done")),
    )
}

fn todo_manager(engine: &MemoryEngine) -> StoreManager<Todo, MemoryEngine> {
    StoreManager::new(todos_config(), engine.clone()).unwrap()
}

#[test]
fn test_single_store_without_target() {
    let manager: StoreManager<Todo, _> =
        StoreManager::new(todos_config(), MemoryEngine::new()).unwrap();
    assert_eq!(manager.store_name(), "todos");
    assert_eq!(manager.version(), 1);
    assert_eq!(manager.key_path().as_str(), "id");
}

#[test]
fn test_several_stores_without_target_fail_before_io() {
    let engine = MemoryEngine::new();
    let config = DbConfig::new("T")
        .store(StoreConfig::new("todos"))
        .store(StoreConfig::new("prefs"));

    let result = StoreManager::<Todo, _>::new(config, engine.clone());

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(engine.opens(), 0);
    assert_eq!(engine.database_version("T"), None);
}

#[tokio::test]
async fn test_open_creates_schema() {
    let engine = MemoryEngine::new();
    let config = DbConfig::new("T")
        .store(StoreConfig::new("todos").index(IndexConfig::new("by_done", "done")))
        .store(StoreConfig::new("prefs").key_path("user"))
        .target("todos");
    let manager: StoreManager<Todo, _> = StoreManager::new(config, engine.clone()).unwrap();

    assert!(!manager.is_open());
    manager.open().await.unwrap();
    assert!(manager.is_open());

    assert_eq!(engine.database_version("T"), Some(1));
    assert_eq!(
        engine.store_names("T"),
        vec!["prefs".to_string(), "todos".to_string()]
    );
    assert_eq!(engine.index_names("T", "todos"), vec!["by_done".to_string()]);

    // Opening again is a no-op
    manager.open().await.unwrap();
    assert_eq!(engine.opens(), 1);
}

#[tokio::test]
async fn test_operations_open_lazily() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);

    assert!(manager.get_all().await.unwrap().is_empty());
    assert!(manager.is_open());
    assert_eq!(engine.opens(), 1);
}

#[tokio::test]
async fn test_concurrent_first_calls_open_once() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);

    let item = todo("a", "x");
    let (a, b, c) = tokio::join!(
        manager.get_all(),
        manager.put(&item),
        manager.get_by_id("a"),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(engine.opens(), 1);
    assert_eq!(engine.connections("T"), 1);
}

#[tokio::test]
async fn test_reopen_at_higher_version_preserves_data() {
    let engine = MemoryEngine::new();
    {
        let manager = todo_manager(&engine);
        manager.put(&todo("a", "x")).await.unwrap();
    }

    let config = DbConfig::new("T")
        .version(2)
        .store(
            StoreConfig::new("todos")
                .index(IndexConfig::new("by_done", "done"))
                .index(IndexConfig::new("by_text", "text")),
        )
        .store(StoreConfig::new("prefs"))
        .target("todos");
    let manager: StoreManager<Todo, _> = StoreManager::new(config, engine.clone()).unwrap();

    assert_eq!(manager.get_all().await.unwrap(), vec![todo("a", "x")]);
    assert_eq!(engine.database_version("T"), Some(2));
    assert_eq!(
        engine.store_names("T"),
        vec!["prefs".to_string(), "todos".to_string()]
    );
    assert_eq!(
        engine.index_names("T", "todos"),
        vec!["by_done".to_string(), "by_text".to_string()]
    );
}

#[tokio::test]
async fn test_reopen_at_same_version_is_harmless() {
    let engine = MemoryEngine::new();
    let first = todo_manager(&engine);
    first.put(&todo("a", "x")).await.unwrap();

    let second = todo_manager(&engine);
    assert_eq!(second.get_all().await.unwrap(), vec![todo("a", "x")]);
}

#[tokio::test]
async fn test_lower_version_is_connection_error() {
    let engine = MemoryEngine::new();
    {
        let manager: StoreManager<Todo, _> =
            StoreManager::new(todos_config().version(3), engine.clone()).unwrap();
        manager.open().await.unwrap();
    }

    let manager = todo_manager(&engine);
    let result = manager.get_all().await;
    assert_eq!(
        result,
        Err(Error::Connection(EngineError::Version(
            "requested version 1 is less than the existing version 3".to_string()
        )))
    );
}

#[tokio::test]
async fn test_upgrade_blocked_by_live_connection() {
    let engine = MemoryEngine::new();
    let old = todo_manager(&engine);
    old.open().await.unwrap();

    let newer: StoreManager<Todo, _> =
        StoreManager::new(todos_config().version(2), engine.clone()).unwrap();
    let result = newer.open().await;
    assert!(matches!(
        result,
        Err(Error::Connection(EngineError::Blocked(_)))
    ));
}

#[tokio::test]
async fn test_failed_open_is_retried() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    engine.fail_next(
        EngineOp::Open,
        EngineError::QuotaExceeded("no space".into()),
    );

    let result = manager.get_all().await;
    assert!(matches!(result, Err(Error::Connection(_))));
    assert!(!manager.is_open());

    assert!(manager.get_all().await.unwrap().is_empty());
    assert!(manager.is_open());
}

#[tokio::test]
async fn test_put_and_get_round_trip() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    let record = todo("a", "x");

    manager.put(&record).await.unwrap();

    assert_eq!(manager.get_by_id("a").await.unwrap(), Some(record));
}

#[tokio::test]
async fn test_get_missing_is_none() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    assert_eq!(manager.get_by_id("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_put_replaces_entire_record() {
    let engine = MemoryEngine::new();
    let config = DbConfig::new("T").store(StoreConfig::new("todos"));
    let manager: StoreManager<Value, _> = StoreManager::new(config, engine).unwrap();

    manager
        .put(&json!({"id": "a", "text": "x", "done": false}))
        .await
        .unwrap();
    manager.put(&json!({"id": "a", "done": true})).await.unwrap();

    assert_eq!(
        manager.get_by_id("a").await.unwrap(),
        Some(json!({"id": "a", "done": true}))
    );
}

#[tokio::test]
async fn test_put_without_key_is_write_error() {
    let engine = MemoryEngine::new();
    let config = DbConfig::new("T").store(StoreConfig::new("todos"));
    let manager: StoreManager<Value, _> = StoreManager::new(config, engine.clone()).unwrap();

    let result = manager.put(&json!({"text": "no id"})).await;

    assert!(matches!(result, Err(Error::Write(EngineError::Data(_)))));
    assert_eq!(engine.record_count("T", "todos"), 0);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    manager.put(&todo("a", "x")).await.unwrap();

    manager.delete_by_id("a").await.unwrap();
    assert_eq!(manager.get_by_id("a").await.unwrap(), None);

    manager.delete_by_id("a").await.unwrap();
    assert_eq!(manager.get_by_id("a").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_all_in_key_order() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    for id in ["c", "a", "b"] {
        manager.put(&todo(id, id)).await.unwrap();
    }

    let ids: Vec<String> = manager
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_clear_all() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    manager.put(&todo("a", "x")).await.unwrap();
    manager.put(&todo("b", "y")).await.unwrap();

    manager.clear_all().await.unwrap();

    assert!(manager.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transaction_failures_map_to_read_and_write() {
    let engine = MemoryEngine::new();
    let manager = todo_manager(&engine);
    manager.put(&todo("a", "x")).await.unwrap();

    engine.fail_next(EngineOp::Put, EngineError::Aborted("put".into()));
    let put = manager.put(&todo("a", "changed")).await;
    assert!(matches!(put, Err(Error::Write(EngineError::Aborted(_)))));
    assert_eq!(manager.get_by_id("a").await.unwrap(), Some(todo("a", "x")));

    engine.fail_next(EngineOp::GetAll, EngineError::Backend("io".into()));
    assert!(matches!(manager.get_all().await, Err(Error::Read(_))));

    engine.fail_next(EngineOp::Get, EngineError::Backend("io".into()));
    assert!(matches!(manager.get_by_id("a").await, Err(Error::Read(_))));

    engine.fail_next(EngineOp::Delete, EngineError::Backend("io".into()));
    assert!(matches!(manager.delete_by_id("a").await, Err(Error::Write(_))));

    engine.fail_next(EngineOp::Clear, EngineError::Backend("io".into()));
    assert!(matches!(manager.clear_all().await, Err(Error::Write(_))));

    assert_eq!(engine.record_count("T", "todos"), 1);
}

#[tokio::test]
async fn test_explicit_target_and_nested_key_path() {
    let engine = MemoryEngine::new();
    let config = DbConfig::new("T")
        .store(StoreConfig::new("todos"))
        .store(StoreConfig::new("prefs").key_path("owner.id"))
        .target("prefs");
    let manager: StoreManager<Value, _> = StoreManager::new(config, engine.clone()).unwrap();

    let prefs = json!({"owner": {"id": 7}, "theme": "dark"});
    manager.put(&prefs).await.unwrap();

    assert_eq!(manager.get_by_id(7).await.unwrap(), Some(prefs));
    assert_eq!(engine.record_count("T", "prefs"), 1);
    assert_eq!(engine.record_count("T", "todos"), 0);
}

#[tokio::test]
async fn test_undecodable_record_is_serialization_error() {
    let engine = MemoryEngine::new();
    let raw: StoreManager<Value, _> = StoreManager::new(todos_config(), engine.clone()).unwrap();
    raw.put(&json!({"id": "a", "text": 5})).await.unwrap();

    let typed = todo_manager(&engine);
    assert!(matches!(
        typed.get_by_id("a").await,
        Err(Error::Serialization(_))
    ));
}
