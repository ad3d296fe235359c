//! In-memory fakes for the snapshot boundary (testing and embedding)
//!
//! `MemorySnapshotStore` satisfies the `SnapshotStore` contract without any
//! external dependencies.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{SphereError, SphereResult};
use crate::snapshot::{ContentDigest, SnapshotStore};

/// Snapshot store backed by a `BTreeMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> SphereResult<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| SphereError::Backend("snapshot store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, key: &str, data: &[u8]) -> SphereResult<ContentDigest> {
        let digest = ContentDigest::from_bytes(data);
        self.blobs()?.insert(key.to_string(), data.to_vec());
        Ok(digest)
    }

    async fn get(&self, key: &str) -> SphereResult<Vec<u8>> {
        self.blobs()?
            .get(key)
            .cloned()
            .ok_or_else(|| SphereError::SnapshotNotFound {
                key: key.to_string(),
            })
    }

    async fn contains(&self, key: &str) -> SphereResult<bool> {
        Ok(self.blobs()?.contains_key(key))
    }

    async fn delete(&self, key: &str) -> SphereResult<()> {
        self.blobs()?.remove(key);
        Ok(())
    }

    async fn keys(&self) -> SphereResult<Vec<String>> {
        Ok(self.blobs()?.keys().cloned().collect())
    }
}
