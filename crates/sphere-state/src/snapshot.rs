//! Snapshot boundary for backups.
//!
//! This crate never touches disk. A full sphere is exported as a
//! [`SphereSnapshot`] and handed to an external [`SnapshotStore`]; restoring
//! is the reverse. In-memory fakes live in the `fakes` module.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{SphereError, SphereResult};
use crate::model::{SphereMeta, SphereRecord};

/// Full point-in-time copy of one sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereSnapshot<T> {
    pub meta: SphereMeta,
    pub records: Vec<SphereRecord<T>>,
}

impl<T> SphereSnapshot<T> {
    /// Check that every record belongs to the snapshot's sphere and that
    /// record ids are unique.
    pub fn validate(&self) -> SphereResult<()> {
        let mut seen = std::collections::HashSet::new();
        for record in &self.records {
            if record.sphere_id != self.meta.id {
                return Err(SphereError::InvalidSnapshot(format!(
                    "record {} belongs to sphere {}, not {}",
                    record.id, record.sphere_id, self.meta.id
                )));
            }
            if !seen.insert(record.id.as_str()) {
                return Err(SphereError::InvalidSnapshot(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
        }
        Ok(())
    }
}

/// SHA-256 hex digest of a stored snapshot blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key-addressed blob store owned by the hosting process.
///
/// Guarantees:
/// - `put(key, data)` replaces any previous blob under `key` and returns the
///   SHA-256 digest of `data`.
/// - `get(key)` returns the exact bytes last stored, or
///   `SphereError::SnapshotNotFound`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> SphereResult<ContentDigest>;

    async fn get(&self, key: &str) -> SphereResult<Vec<u8>>;

    async fn contains(&self, key: &str) -> SphereResult<bool>;

    /// No-op if absent.
    async fn delete(&self, key: &str) -> SphereResult<()>;

    /// All keys, sorted.
    async fn keys(&self) -> SphereResult<Vec<String>>;
}

/// Storage key used for a sphere's snapshot.
pub fn sphere_key(sphere_id: &str) -> String {
    format!("sphere/{sphere_id}")
}

/// Serialize a sphere snapshot and hand it to the external store.
pub async fn save_sphere<T: Serialize>(
    store: &dyn SnapshotStore,
    snapshot: &SphereSnapshot<T>,
) -> SphereResult<ContentDigest> {
    let bytes = serde_json::to_vec(snapshot)?;
    let digest = store.put(&sphere_key(&snapshot.meta.id), &bytes).await?;
    tracing::debug!(
        event = "sphere.snapshot_saved",
        sphere_id = %snapshot.meta.id,
        records = snapshot.records.len(),
        digest = %digest.short(),
    );
    Ok(digest)
}

/// Load and validate a sphere snapshot from the external store.
pub async fn load_sphere<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    sphere_id: &str,
) -> SphereResult<SphereSnapshot<T>> {
    let bytes = store.get(&sphere_key(sphere_id)).await?;
    let snapshot: SphereSnapshot<T> = serde_json::from_slice(&bytes)?;
    if snapshot.meta.id != sphere_id {
        return Err(SphereError::InvalidSnapshot(format!(
            "key names sphere {sphere_id} but snapshot holds {}",
            snapshot.meta.id
        )));
    }
    snapshot.validate()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let a = ContentDigest::from_bytes(b"sphere");
        let b = ContentDigest::from_bytes(b"sphere");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_sphere_key() {
        assert_eq!(sphere_key("biz-1"), "sphere/biz-1");
    }
}
