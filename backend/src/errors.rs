use thiserror::Error;

/// Typed failure kinds surfaced by the storage layer.
///
/// Load failures are fatal to a backend instance until `reset()`; write
/// failures are per-call and leave the backend loaded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("storage failed to load: {0}")]
    StoreLoadFailed(String),

    #[error("schema setup failed: {0}")]
    SchemaFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage backend is still loading")]
    NotReady,

    #[error("timed out waiting for storage to load")]
    Timeout,
}

impl PersistenceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PersistenceError::NotFound { kind, id: id.into() }
    }

    pub fn write(err: impl std::fmt::Display) -> Self {
        PersistenceError::WriteFailed(err.to_string())
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, PersistenceError>;
