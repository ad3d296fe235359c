//! Error types for the memory subsystem.

/// Errors produced by memory operations.
///
/// Batch agent queries never produce `AccessDenied`; denials there are
/// counted in the query result instead.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("entry not found: {id}")]
    EntryNotFound { id: String },

    #[error("already exists: {id}")]
    AlreadyExists { id: String },

    #[error("access denied to {entry_id}: {reason}")]
    AccessDenied { entry_id: String, reason: String },

    #[error("invalid cross-sphere link: {0}")]
    InvalidLink(String),

    #[error("invalid decision trace: {0}")]
    InvalidDecision(String),

    #[error("invalid memory snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
