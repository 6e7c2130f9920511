//! Error types for store manager and binding operations

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for idbkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`crate::StoreManager`] and [`crate::Binding`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Invalid or ambiguous configuration, reported before any I/O
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Database open or upgrade failed
    #[error("connection error: {0}")]
    Connection(EngineError),

    /// Read transaction failed
    #[error("read error: {0}")]
    Read(EngineError),

    /// Write transaction failed
    #[error("write error: {0}")]
    Write(EngineError),

    /// Record could not be converted to or from its stored form
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
