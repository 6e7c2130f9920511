//! Error types for the IndexedDB engine

use idbkit_core::EngineError;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::DomException;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors that can occur while talking to IndexedDB
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// Database open request could not be issued
    #[error("IndexedDB open error: {0}")]
    Open(String),

    /// Open or delete request blocked by another connection
    #[error("IndexedDB database '{0}' is blocked")]
    Blocked(String),

    /// Transaction could not be started
    #[error("IndexedDB transaction error: {0}")]
    Transaction(String),

    /// DOMException raised by a request or transaction
    #[error("{name}: {message}")]
    Dom { name: String, message: String },

    /// Upgrade handler failed inside the version-change transaction
    #[error("upgrade failed: {0}")]
    Upgrade(EngineError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JavaScript value conversion error
    #[error("JS conversion error: {0}")]
    JsValue(String),
}

impl IndexedDbError {
    pub(crate) fn js(context: &str, val: &JsValue) -> Self {
        IndexedDbError::JsValue(format!("{}: {}", context, describe(val)))
    }
}

impl From<JsValue> for IndexedDbError {
    fn from(val: JsValue) -> Self {
        match val.dyn_ref::<DomException>() {
            Some(dom) => IndexedDbError::Dom {
                name: dom.name(),
                message: dom.message(),
            },
            None => IndexedDbError::JsValue(describe(&val)),
        }
    }
}

/// Map to the engine error the store manager understands
impl From<IndexedDbError> for EngineError {
    fn from(err: IndexedDbError) -> Self {
        match err {
            IndexedDbError::NotAvailable(msg) => EngineError::NotAvailable(msg),
            IndexedDbError::Blocked(name) => EngineError::Blocked(name),
            IndexedDbError::Upgrade(inner) => inner,
            IndexedDbError::Dom { name, message } => match name.as_str() {
                "VersionError" => EngineError::Version(message),
                "QuotaExceededError" => EngineError::QuotaExceeded(message),
                "NotFoundError" => EngineError::UnknownStore(message),
                "DataError" | "DataCloneError" => EngineError::Data(message),
                "ConstraintError" => EngineError::Constraint(message),
                "AbortError" => EngineError::Aborted(message),
                "SecurityError" | "InvalidAccessError" => EngineError::NotAvailable(message),
                _ => EngineError::Backend(format!("{}: {}", name, message)),
            },
            IndexedDbError::Json(e) => EngineError::Data(e.to_string()),
            other @ (IndexedDbError::Open(_)
            | IndexedDbError::Transaction(_)
            | IndexedDbError::JsValue(_)) => EngineError::Backend(other.to_string()),
        }
    }
}

fn describe(val: &JsValue) -> String {
    if let Some(s) = val.as_string() {
        return s;
    }
    js_sys::JSON::stringify(val)
        .map(String::from)
        .unwrap_or_else(|_| format!("{:?}", val))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom(name: &str) -> IndexedDbError {
        IndexedDbError::Dom {
            name: name.to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_dom_exceptions_map_to_engine_errors() {
        assert_eq!(
            EngineError::from(dom("VersionError")),
            EngineError::Version("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("QuotaExceededError")),
            EngineError::QuotaExceeded("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("ConstraintError")),
            EngineError::Constraint("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("DataError")),
            EngineError::Data("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("NotFoundError")),
            EngineError::UnknownStore("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("AbortError")),
            EngineError::Aborted("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("UnknownError")),
            EngineError::Backend("UnknownError: boom".into())
        );
    }

    #[test]
    fn test_upgrade_failure_keeps_handler_error() {
        let err = IndexedDbError::Upgrade(EngineError::Data("bad key path".into()));
        assert_eq!(
            EngineError::from(err),
            EngineError::Data("bad key path".into())
        );
    }

    #[test]
    fn test_blocked_and_unavailable() {
        assert_eq!(
            EngineError::from(IndexedDbError::Blocked("T".into())),
            EngineError::Blocked("T".into())
        );
        assert!(matches!(
            EngineError::from(IndexedDbError::NotAvailable("no global".into())),
            EngineError::NotAvailable(_)
        ));
        assert!(matches!(
            EngineError::from(IndexedDbError::Transaction("closing".into())),
            EngineError::Backend(_)
        ));
    }
}
