//! Storage engine error types

use thiserror::Error;

/// Errors reported by a storage engine.
///
/// These are the engine's own failure reasons. The store manager wraps them
/// into [`crate::Error`] according to the operation that failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine is not available in this environment
    #[error("storage engine not available: {0}")]
    NotAvailable(String),

    /// Version change blocked by another open connection
    #[error("database '{0}' is blocked by another open connection")]
    Blocked(String),

    /// Requested version is lower than the stored one
    #[error("version error: {0}")]
    Version(String),

    /// Storage quota exhausted
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Store is not part of the opened database
    #[error("object store not found: {0}")]
    UnknownStore(String),

    /// Record or key is not acceptable to the store
    #[error("data error: {0}")]
    Data(String),

    /// Unique index violated
    #[error("constraint error: {0}")]
    Constraint(String),

    /// Transaction aborted before committing
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// Any other backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
