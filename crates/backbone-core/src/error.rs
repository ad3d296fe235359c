//! Top-level error taxonomy for the backbone.

use std::time::Duration;

use sphere_state::SphereError;

use crate::memory::MemoryError;

/// Errors surfaced by the backbone facade and its concurrent handle.
#[derive(Debug, thiserror::Error)]
pub enum BackboneError {
    #[error("sphere error: {0}")]
    Sphere(#[from] SphereError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("timed out after {duration:?} waiting for the {store} lock")]
    Timeout {
        store: &'static str,
        duration: Duration,
    },

    #[error("{store} is busy")]
    Busy { store: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackboneError {
    /// True for unknown sphere, record or entry ids.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Sphere(e) => e.is_not_found(),
            Self::Memory(MemoryError::EntryNotFound { .. }) => true,
            _ => false,
        }
    }

    /// True for lock contention (`Busy` or `Timeout`).
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Timeout { .. })
    }
}

/// Result type for backbone operations.
pub type BackboneResult<T> = std::result::Result<T, BackboneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_layer_errors() {
        let err: BackboneError = SphereError::SphereNotFound("biz-1".into()).into();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("biz-1"));

        let err: BackboneError = MemoryError::EntryNotFound { id: "e1".into() }.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_timeout_display() {
        let err = BackboneError::Timeout {
            store: "memory",
            duration: Duration::from_millis(500),
        };
        assert!(err.is_contention());
        assert_eq!(err.to_string(), "timed out after 500ms waiting for the memory lock");
    }
}
