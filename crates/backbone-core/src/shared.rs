//! `SharedBackbone`: cloneable concurrent handle over both stores.
//!
//! Each logical store sits behind its own `tokio::sync::RwLock`, so an entry
//! and its pointer (or a decision and its narrative entry) are committed as
//! one unit as seen by any reader. Lock acquisition is bounded by the
//! configured timeout and surfaces `BackboneError::Timeout` instead of
//! waiting forever. Change events committed through a write guard are held
//! until the guard releases its lock, so a subscriber that re-reads on
//! notification never contends with the writer. Snapshots are taken under
//! the lock and shipped to the external store after it is released.

use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sphere_state::{
    load_sphere, save_sphere, ChangeEvent, ChangeFeed, ContentDigest, DeferredPublish,
    SnapshotStore, SphereMeta, SphereStore,
};
use tokio::sync::{broadcast, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::BackboneConfig;
use crate::error::{BackboneError, BackboneResult};
use crate::manager::{MemoryManager, MemorySnapshot};
use crate::memory::{AccessContext, AgentQuery, AgentQueryResult};
use crate::obs;

/// Storage key used for the memory snapshot.
pub const MEMORY_SNAPSHOT_KEY: &str = "memory";

const SPHERES: &str = "spheres";
const MEMORY: &str = "memory";

/// Events queued by a write guard, published when dropped.
struct PendingEvents {
    feed: ChangeFeed,
    events: Vec<ChangeEvent>,
}

impl Drop for PendingEvents {
    fn drop(&mut self) {
        for event in self.events.drain(..) {
            self.feed.publish_event(event);
        }
    }
}

/// Write access to one store. Events committed through the guard are
/// published after the lock is released.
pub struct StoreWriteGuard<'a, T: DeferredPublish> {
    // Fields drop in declaration order: the lock goes before `pending`.
    inner: RwLockWriteGuard<'a, T>,
    pending: PendingEvents,
}

impl<'a, T: DeferredPublish> StoreWriteGuard<'a, T> {
    fn new(mut inner: RwLockWriteGuard<'a, T>, feed: &ChangeFeed) -> Self {
        inner.hold_events();
        Self {
            inner,
            pending: PendingEvents {
                feed: feed.clone(),
                events: Vec::new(),
            },
        }
    }
}

impl<T: DeferredPublish> Deref for StoreWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: DeferredPublish> DerefMut for StoreWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: DeferredPublish + fmt::Debug> fmt::Debug for StoreWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWriteGuard")
            .field("inner", &*self.inner)
            .field("pending", &self.pending.events.len())
            .finish()
    }
}

impl<T: DeferredPublish> Drop for StoreWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.pending.events = self.inner.take_held_events();
    }
}

#[derive(Clone)]
pub struct SharedBackbone {
    spheres: Arc<RwLock<SphereStore<Value>>>,
    memory: Arc<RwLock<MemoryManager>>,
    feed: ChangeFeed,
    lock_timeout: Duration,
}

impl SharedBackbone {
    /// Build both stores from `config`, publishing into one shared feed.
    ///
    /// # Errors
    ///
    /// Returns `BackboneError::Config` if `config` fails validation.
    pub fn new(config: &BackboneConfig) -> BackboneResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    fn assemble(config: &BackboneConfig) -> Self {
        let feed = ChangeFeed::new(config.notifications.channel_capacity);
        Self {
            spheres: Arc::new(RwLock::new(SphereStore::with_feed(feed.clone()))),
            memory: Arc::new(RwLock::new(MemoryManager::assemble(config, feed.clone()))),
            feed,
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Change events from both stores. Events name their source.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    async fn acquire<F: Future>(&self, store: &'static str, lock: F) -> BackboneResult<F::Output> {
        tokio::time::timeout(self.lock_timeout, lock)
            .await
            .map_err(|_| {
                obs::emit_lock_timeout(store, self.lock_timeout);
                BackboneError::Timeout {
                    store,
                    duration: self.lock_timeout,
                }
            })
    }

    pub async fn read_spheres(&self) -> BackboneResult<RwLockReadGuard<'_, SphereStore<Value>>> {
        self.acquire(SPHERES, self.spheres.read()).await
    }

    pub async fn write_spheres(&self) -> BackboneResult<StoreWriteGuard<'_, SphereStore<Value>>> {
        let guard = self.acquire(SPHERES, self.spheres.write()).await?;
        Ok(StoreWriteGuard::new(guard, &self.feed))
    }

    pub async fn read_memory(&self) -> BackboneResult<RwLockReadGuard<'_, MemoryManager>> {
        self.acquire(MEMORY, self.memory.read()).await
    }

    pub async fn write_memory(&self) -> BackboneResult<StoreWriteGuard<'_, MemoryManager>> {
        let guard = self.acquire(MEMORY, self.memory.write()).await?;
        Ok(StoreWriteGuard::new(guard, &self.feed))
    }

    /// Non-blocking write access.
    ///
    /// # Errors
    ///
    /// Returns `BackboneError::Busy` if any reader or writer holds the lock.
    pub fn try_write_memory(&self) -> BackboneResult<StoreWriteGuard<'_, MemoryManager>> {
        let guard = self
            .memory
            .try_write()
            .map_err(|_| BackboneError::Busy { store: MEMORY })?;
        Ok(StoreWriteGuard::new(guard, &self.feed))
    }

    pub async fn query_for_agent(
        &self,
        query: &AgentQuery,
        ctx: &AccessContext,
    ) -> BackboneResult<AgentQueryResult> {
        let memory = self.read_memory().await?;
        Ok(memory.query_for_agent(query, ctx))
    }

    /// Export `sphere_id` and store it under its sphere key.
    pub async fn backup_sphere(
        &self,
        store: &dyn SnapshotStore,
        sphere_id: &str,
    ) -> BackboneResult<ContentDigest> {
        let snapshot = self.read_spheres().await?.export_sphere(sphere_id)?;
        Ok(save_sphere(store, &snapshot).await?)
    }

    /// Load `sphere_id` from `store` and import it. Fails if the id is
    /// already occupied.
    pub async fn restore_sphere(
        &self,
        store: &dyn SnapshotStore,
        sphere_id: &str,
    ) -> BackboneResult<SphereMeta> {
        let snapshot = load_sphere::<Value>(store, sphere_id).await?;
        let meta = self.write_spheres().await?.import_sphere(snapshot)?;
        Ok(meta)
    }

    pub async fn backup_memory(&self, store: &dyn SnapshotStore) -> BackboneResult<ContentDigest> {
        let snapshot = self.read_memory().await?.export();
        let bytes = serde_json::to_vec(&snapshot)?;
        Ok(store.put(MEMORY_SNAPSHOT_KEY, &bytes).await?)
    }

    /// Replace memory state with the stored snapshot.
    pub async fn restore_memory(&self, store: &dyn SnapshotStore) -> BackboneResult<()> {
        let bytes = store.get(MEMORY_SNAPSHOT_KEY).await?;
        let snapshot: MemorySnapshot = serde_json::from_slice(&bytes)?;
        self.write_memory().await?.import(snapshot)?;
        Ok(())
    }
}

impl Default for SharedBackbone {
    fn default() -> Self {
        Self::assemble(&BackboneConfig::default())
    }
}
