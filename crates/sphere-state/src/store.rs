//! `SphereStore`: isolated per-sphere record storage.
//!
//! Every record operation is addressed by `(sphere_id, record_id)`; a record
//! id is never resolvable through another sphere's id and no operation scans
//! across spheres. Cross-sphere reads belong to the guarded memory layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SphereError, SphereResult};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeSource, DeferredPublish, HeldEvents};
use crate::model::{
    RecordOptions, RecordPatch, SphereMeta, SphereOptions, SpherePatch, SphereRecord,
};
use crate::snapshot::SphereSnapshot;

#[derive(Debug)]
struct Sphere<T> {
    meta: SphereMeta,
    records: HashMap<String, SphereRecord<T>>,
}

impl<T> Sphere<T> {
    fn record(&self, record_id: &str) -> SphereResult<&SphereRecord<T>> {
        self.records
            .get(record_id)
            .ok_or_else(|| SphereError::RecordNotFound {
                sphere_id: self.meta.id.clone(),
                record_id: record_id.to_string(),
            })
    }

    /// Records sorted oldest first, ties broken by id.
    fn sorted(&self) -> Vec<&SphereRecord<T>> {
        let mut records: Vec<&SphereRecord<T>> = self.records.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

/// Tenant-isolated key/value record store.
#[derive(Debug)]
pub struct SphereStore<T> {
    spheres: HashMap<String, Sphere<T>>,
    revision: u64,
    feed: ChangeFeed,
    held: HeldEvents,
}

impl<T: Clone> SphereStore<T> {
    pub fn new() -> Self {
        Self::with_feed(ChangeFeed::default())
    }

    /// Create a store publishing into an existing feed.
    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            spheres: HashMap::new(),
            revision: 0,
            feed,
            held: HeldEvents::default(),
        }
    }

    /// Receive a [`ChangeEvent`] after each committed mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Store-wide count of committed mutations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn commit(&mut self) {
        self.revision += 1;
        let event = ChangeEvent {
            source: ChangeSource::Sphere,
            revision: self.revision,
        };
        self.held.publish_or_hold(&self.feed, event);
    }

    fn sphere(&self, id: &str) -> SphereResult<&Sphere<T>> {
        self.spheres
            .get(id)
            .ok_or_else(|| SphereError::SphereNotFound(id.to_string()))
    }

    fn sphere_mut(&mut self, id: &str) -> SphereResult<&mut Sphere<T>> {
        self.spheres
            .get_mut(id)
            .ok_or_else(|| SphereError::SphereNotFound(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Spheres
    // -----------------------------------------------------------------------

    /// Create a sphere with defaults (private, long-term retention) merged
    /// with `options`.
    ///
    /// # Errors
    ///
    /// Returns `SphereError::AlreadyExists` if `id` is taken.
    pub fn create_sphere(
        &mut self,
        id: &str,
        owner_id: &str,
        options: SphereOptions,
    ) -> SphereResult<SphereMeta> {
        if self.spheres.contains_key(id) {
            return Err(SphereError::AlreadyExists(id.to_string()));
        }
        let now = Utc::now();
        let meta = SphereMeta {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            display_name: options.display_name.unwrap_or_else(|| id.to_string()),
            visibility: options.visibility.unwrap_or_default(),
            encryption_level: options.encryption_level.unwrap_or_default(),
            retention_policy: options.retention_policy.unwrap_or_default(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.spheres.insert(
            id.to_string(),
            Sphere {
                meta: meta.clone(),
                records: HashMap::new(),
            },
        );
        self.commit();
        info!(event = "sphere.created", sphere_id = %id, owner_id = %owner_id);
        Ok(meta)
    }

    pub fn get_sphere(&self, id: &str) -> SphereResult<&SphereMeta> {
        self.sphere(id).map(|s| &s.meta)
    }

    /// All sphere metadata, sorted by id.
    pub fn list_spheres(&self) -> Vec<&SphereMeta> {
        let mut metas: Vec<&SphereMeta> = self.spheres.values().map(|s| &s.meta).collect();
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        metas
    }

    pub fn update_sphere(&mut self, id: &str, patch: SpherePatch) -> SphereResult<SphereMeta> {
        let sphere = self.sphere_mut(id)?;
        if let Some(name) = patch.display_name {
            sphere.meta.display_name = name;
        }
        if let Some(visibility) = patch.visibility {
            sphere.meta.visibility = visibility;
        }
        if let Some(level) = patch.encryption_level {
            sphere.meta.encryption_level = level;
        }
        if let Some(policy) = patch.retention_policy {
            sphere.meta.retention_policy = policy;
        }
        sphere.meta.touch(Utc::now());
        let meta = sphere.meta.clone();
        self.commit();
        Ok(meta)
    }

    /// Remove a sphere together with all of its records.
    pub fn delete_sphere(&mut self, id: &str) -> SphereResult<SphereMeta> {
        let sphere = self
            .spheres
            .remove(id)
            .ok_or_else(|| SphereError::SphereNotFound(id.to_string()))?;
        self.commit();
        info!(
            event = "sphere.deleted",
            sphere_id = %id,
            records = sphere.records.len(),
        );
        Ok(sphere.meta)
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    pub fn create_record(
        &mut self,
        sphere_id: &str,
        author_id: &str,
        data: T,
        options: RecordOptions,
    ) -> SphereResult<SphereRecord<T>> {
        let sphere = self.sphere_mut(sphere_id)?;
        let now = Utc::now();
        let record = SphereRecord {
            id: Uuid::new_v4().to_string(),
            sphere_id: sphere_id.to_string(),
            author_id: author_id.to_string(),
            author_kind: options.author_kind,
            data,
            tags: options.tags,
            sensitivity: options.sensitivity,
            expires_at: options.expires_at,
            created_at: now,
            updated_at: now,
        };
        sphere.records.insert(record.id.clone(), record.clone());
        sphere.meta.touch(now);
        self.commit();
        debug!(
            event = "sphere.record_created",
            sphere_id = %sphere_id,
            record_id = %record.id,
            sensitivity = %record.sensitivity,
        );
        Ok(record)
    }

    /// Unguarded read for the sphere's own host code.
    pub fn get_record(&self, sphere_id: &str, record_id: &str) -> SphereResult<&SphereRecord<T>> {
        self.sphere(sphere_id)?.record(record_id)
    }

    /// Read on behalf of `requester_id`. Records the requester may not see
    /// are reported as `RecordNotFound`.
    pub fn get_record_for(
        &self,
        sphere_id: &str,
        record_id: &str,
        requester_id: &str,
    ) -> SphereResult<&SphereRecord<T>> {
        let sphere = self.sphere(sphere_id)?;
        let record = sphere.record(record_id)?;
        if record.is_visible_to(requester_id, &sphere.meta.owner_id) {
            Ok(record)
        } else {
            Err(SphereError::RecordNotFound {
                sphere_id: sphere_id.to_string(),
                record_id: record_id.to_string(),
            })
        }
    }

    /// All records of one sphere, oldest first.
    pub fn records(&self, sphere_id: &str) -> SphereResult<Vec<&SphereRecord<T>>> {
        Ok(self.sphere(sphere_id)?.sorted())
    }

    /// Records of one sphere visible to `requester_id`, oldest first.
    pub fn records_for(
        &self,
        sphere_id: &str,
        requester_id: &str,
    ) -> SphereResult<Vec<&SphereRecord<T>>> {
        let sphere = self.sphere(sphere_id)?;
        let owner = sphere.meta.owner_id.as_str();
        Ok(sphere
            .sorted()
            .into_iter()
            .filter(|r| r.is_visible_to(requester_id, owner))
            .collect())
    }

    pub fn update_record(
        &mut self,
        sphere_id: &str,
        record_id: &str,
        patch: RecordPatch<T>,
    ) -> SphereResult<SphereRecord<T>> {
        let sphere = self.sphere_mut(sphere_id)?;
        let now = Utc::now();
        let record = sphere
            .records
            .get_mut(record_id)
            .ok_or_else(|| SphereError::RecordNotFound {
                sphere_id: sphere_id.to_string(),
                record_id: record_id.to_string(),
            })?;
        if let Some(data) = patch.data {
            record.data = data;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        if let Some(sensitivity) = patch.sensitivity {
            record.sensitivity = sensitivity;
        }
        if let Some(expires_at) = patch.expires_at {
            record.expires_at = expires_at;
        }
        record.updated_at = now;
        let updated = record.clone();
        sphere.meta.touch(now);
        self.commit();
        Ok(updated)
    }

    pub fn delete_record(
        &mut self,
        sphere_id: &str,
        record_id: &str,
    ) -> SphereResult<SphereRecord<T>> {
        let sphere = self.sphere_mut(sphere_id)?;
        let record = sphere
            .records
            .remove(record_id)
            .ok_or_else(|| SphereError::RecordNotFound {
                sphere_id: sphere_id.to_string(),
                record_id: record_id.to_string(),
            })?;
        sphere.meta.touch(Utc::now());
        self.commit();
        Ok(record)
    }

    /// Records carrying at least one of `tags`, oldest first.
    pub fn query_by_tags(
        &self,
        sphere_id: &str,
        tags: &[&str],
    ) -> SphereResult<Vec<&SphereRecord<T>>> {
        Ok(self
            .sphere(sphere_id)?
            .sorted()
            .into_iter()
            .filter(|r| r.has_any_tag(tags))
            .collect())
    }

    /// Records created within `[start, end]` (inclusive), oldest first.
    pub fn query_by_date_range(
        &self,
        sphere_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SphereResult<Vec<&SphereRecord<T>>> {
        Ok(self
            .sphere(sphere_id)?
            .sorted()
            .into_iter()
            .filter(|r| r.created_at >= start && r.created_at <= end)
            .collect())
    }

    /// Delete records whose expiry has passed. Returns the count removed.
    pub fn cleanup_expired(&mut self, sphere_id: &str) -> SphereResult<usize> {
        self.cleanup_expired_at(sphere_id, Utc::now())
    }

    pub fn cleanup_expired_at(&mut self, sphere_id: &str, now: DateTime<Utc>) -> SphereResult<usize> {
        let sphere = self.sphere_mut(sphere_id)?;
        let before = sphere.records.len();
        sphere.records.retain(|_, r| !r.is_expired_at(now));
        let removed = before - sphere.records.len();
        if removed > 0 {
            sphere.meta.touch(now);
            self.commit();
            info!(event = "sphere.cleanup", sphere_id = %sphere_id, removed);
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Backup boundary
    // -----------------------------------------------------------------------

    pub fn export_sphere(&self, id: &str) -> SphereResult<SphereSnapshot<T>> {
        let sphere = self.sphere(id)?;
        Ok(SphereSnapshot {
            meta: sphere.meta.clone(),
            records: sphere.sorted().into_iter().cloned().collect(),
        })
    }

    /// Restore a snapshot under its own id. Never overwrites.
    ///
    /// # Errors
    ///
    /// Returns `SphereError::AlreadyExists` if the id is occupied and
    /// `SphereError::InvalidSnapshot` if a record names another sphere.
    pub fn import_sphere(&mut self, snapshot: SphereSnapshot<T>) -> SphereResult<SphereMeta> {
        if self.spheres.contains_key(&snapshot.meta.id) {
            return Err(SphereError::AlreadyExists(snapshot.meta.id));
        }
        snapshot.validate()?;
        let SphereSnapshot { meta, records } = snapshot;
        let count = records.len();
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.spheres.insert(
            meta.id.clone(),
            Sphere {
                meta: meta.clone(),
                records,
            },
        );
        self.commit();
        info!(event = "sphere.imported", sphere_id = %meta.id, records = count);
        Ok(meta)
    }
}

impl<T: Clone> Default for SphereStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeferredPublish for SphereStore<T> {
    fn hold_events(&mut self) {
        self.held.hold();
    }

    fn take_held_events(&mut self) -> Vec<ChangeEvent> {
        self.held.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActorKind, Sensitivity};
    use chrono::Duration;

    fn store_with(id: &str) -> SphereStore<String> {
        let mut store = SphereStore::new();
        store
            .create_sphere(id, "owner", SphereOptions::default())
            .unwrap();
        store
    }

    #[test]
    fn test_create_sphere_defaults() {
        let store = store_with("s1");
        let meta = store.get_sphere("s1").unwrap();
        assert_eq!(meta.display_name, "s1");
        assert_eq!(meta.version, 1);
        assert_eq!(meta.visibility, crate::model::Visibility::Private);
    }

    #[test]
    fn test_update_sphere_bumps_version() {
        let mut store = store_with("s1");
        let before = store.get_sphere("s1").unwrap().clone();

        let patch = SpherePatch::default()
            .with_display_name("Household")
            .with_visibility(crate::model::Visibility::Shared)
            .with_retention(crate::model::RetentionPolicy::Permanent);
        let after = store.update_sphere("s1", patch).unwrap();

        assert_eq!(after.display_name, "Household");
        assert_eq!(after.visibility, crate::model::Visibility::Shared);
        assert_eq!(after.retention_policy, crate::model::RetentionPolicy::Permanent);
        assert_eq!(after.encryption_level, before.encryption_level);
        assert!(after.version > before.version);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.id, before.id);
        assert_eq!(after.owner_id, before.owner_id);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(store.get_sphere("s1").unwrap(), &after);

        let err = store
            .update_sphere("missing", SpherePatch::default())
            .unwrap_err();
        assert!(matches!(err, SphereError::SphereNotFound(id) if id == "missing"));
    }

    #[test]
    fn test_held_events_wait_for_release() {
        let mut store = store_with("s1");
        let mut rx = store.subscribe();

        store.hold_events();
        store
            .create_record("s1", "owner", "x".to_string(), RecordOptions::default())
            .unwrap();
        assert!(rx.try_recv().is_err());

        let held = store.take_held_events();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].revision, store.revision());

        store.delete_sphere("s1").unwrap();
        assert_eq!(rx.try_recv().unwrap().revision, store.revision());
    }

    #[test]
    fn test_create_sphere_duplicate() {
        let mut store = store_with("s1");
        let err = store
            .create_sphere("s1", "other", SphereOptions::default())
            .unwrap_err();
        assert!(matches!(err, SphereError::AlreadyExists(_)));
    }

    #[test]
    fn test_create_record_missing_sphere() {
        let mut store: SphereStore<String> = SphereStore::new();
        let err = store
            .create_record("nope", "u1", "x".into(), RecordOptions::default())
            .unwrap_err();
        assert!(matches!(err, SphereError::SphereNotFound(_)));
    }

    #[test]
    fn test_create_record_bumps_meta() {
        let mut store = store_with("s1");
        let before = store.get_sphere("s1").unwrap().clone();
        let record = store
            .create_record(
                "s1",
                "u1",
                "hello".into(),
                RecordOptions::default().authored_by(ActorKind::Agent),
            )
            .unwrap();
        let after = store.get_sphere("s1").unwrap();
        assert_eq!(record.sphere_id, "s1");
        assert_eq!(record.author_kind, ActorKind::Agent);
        assert!(after.version > before.version);
        assert!(after.updated_at >= before.updated_at);
    }

    #[test]
    fn test_record_not_resolvable_from_other_sphere() {
        let mut store = store_with("s1");
        store
            .create_sphere("s2", "owner", SphereOptions::default())
            .unwrap();
        let record = store
            .create_record("s1", "u1", "a".into(), RecordOptions::default())
            .unwrap();
        assert!(store.get_record("s1", &record.id).is_ok());
        assert!(matches!(
            store.get_record("s2", &record.id),
            Err(SphereError::RecordNotFound { .. })
        ));
        assert!(store.delete_record("s2", &record.id).is_err());
    }

    #[test]
    fn test_update_record() {
        let mut store = store_with("s1");
        let record = store
            .create_record("s1", "u1", "v1".into(), RecordOptions::default())
            .unwrap();
        let updated = store
            .update_record(
                "s1",
                &record.id,
                RecordPatch::default()
                    .with_data("v2".to_string())
                    .with_tags(&["x"])
                    .with_sensitivity(Sensitivity::Public),
            )
            .unwrap();
        assert_eq!(updated.data, "v2");
        assert!(updated.tags.contains("x"));
        assert_eq!(updated.sensitivity, Sensitivity::Public);
        assert_eq!(updated.created_at, record.created_at);
    }

    #[test]
    fn test_query_by_tags_and_dates() {
        let mut store = store_with("s1");
        let a = store
            .create_record("s1", "u1", "a".into(), RecordOptions::default().with_tag("finance"))
            .unwrap();
        store
            .create_record("s1", "u1", "b".into(), RecordOptions::default().with_tag("health"))
            .unwrap();

        let tagged = store.query_by_tags("s1", &["finance", "travel"]).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, a.id);

        let all = store
            .query_by_date_range("s1", a.created_at, Utc::now())
            .unwrap();
        assert_eq!(all.len(), 2);
        let none = store
            .query_by_date_range(
                "s1",
                Utc::now() + Duration::hours(1),
                Utc::now() + Duration::hours(2),
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let mut store = store_with("s1");
        let now = Utc::now();
        store
            .create_record(
                "s1",
                "u1",
                "old".into(),
                RecordOptions::default().expires_at(now - Duration::minutes(1)),
            )
            .unwrap();
        store
            .create_record(
                "s1",
                "u1",
                "future".into(),
                RecordOptions::default().expires_at(now + Duration::days(1)),
            )
            .unwrap();
        store
            .create_record("s1", "u1", "forever".into(), RecordOptions::default())
            .unwrap();

        assert_eq!(store.cleanup_expired_at("s1", now).unwrap(), 1);
        assert_eq!(store.cleanup_expired_at("s1", now).unwrap(), 0);
        assert_eq!(store.records("s1").unwrap().len(), 2);
    }

    #[test]
    fn test_import_rejects_occupied_id() {
        let mut store = store_with("s1");
        let snapshot = store.export_sphere("s1").unwrap();
        let err = store.import_sphere(snapshot).unwrap_err();
        assert!(matches!(err, SphereError::AlreadyExists(_)));
    }

    #[test]
    fn test_import_rejects_foreign_record() {
        let mut source = store_with("s1");
        source
            .create_record("s1", "u1", "a".into(), RecordOptions::default())
            .unwrap();
        let mut snapshot = source.export_sphere("s1").unwrap();
        snapshot.records[0].sphere_id = "s2".into();

        let mut target: SphereStore<String> = SphereStore::new();
        let err = target.import_sphere(snapshot).unwrap_err();
        assert!(matches!(err, SphereError::InvalidSnapshot(_)));
        assert!(target.get_sphere("s1").is_err());
    }

    #[test]
    fn test_delete_sphere_drops_records() {
        let mut store = store_with("s1");
        store
            .create_record("s1", "u1", "a".into(), RecordOptions::default())
            .unwrap();
        store.delete_sphere("s1").unwrap();
        assert!(store.records("s1").is_err());
        assert!(store.list_spheres().is_empty());
    }

    #[test]
    fn test_mutations_publish_changes() {
        let mut store = store_with("s1");
        let mut rx = store.subscribe();
        store
            .create_record("s1", "u1", "a".into(), RecordOptions::default())
            .unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.source, ChangeSource::Sphere);
        assert_eq!(event.revision, store.revision());
        // Reads publish nothing.
        store.records("s1").unwrap();
        assert!(rx.try_recv().is_err());
    }
}
