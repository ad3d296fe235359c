//! Error types for sphere-state

use thiserror::Error;

/// Errors produced by sphere storage and the snapshot boundary
#[derive(Error, Debug)]
pub enum SphereError {
    /// No sphere with this id
    #[error("Sphere not found: {0}")]
    SphereNotFound(String),

    /// Record id not resolvable inside the given sphere
    #[error("Record not found: {record_id} in sphere {sphere_id}")]
    RecordNotFound {
        sphere_id: String,
        record_id: String,
    },

    /// Duplicate sphere id on create or import
    #[error("Sphere already exists: {0}")]
    AlreadyExists(String),

    /// Snapshot contents violate an isolation invariant
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// No snapshot stored under this key
    #[error("Snapshot not found: {key}")]
    SnapshotNotFound { key: String },

    /// External snapshot backend failure
    #[error("Snapshot backend failed: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SphereError {
    /// True for the structural "unknown id" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SphereNotFound(_) | Self::RecordNotFound { .. } | Self::SnapshotNotFound { .. }
        )
    }
}

/// Result type for sphere-state operations
pub type SphereResult<T> = std::result::Result<T, SphereError>;
