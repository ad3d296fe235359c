//! Content-free catalogue of memory entries.
//!
//! A [`MemoryIndexPointer`] answers "what exists and who may see it" without
//! carrying content. Pointers are created, resynced and removed only by the
//! memory store, in the same call that mutates the entry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphere_state::Sensitivity;

use super::entry::{MemoryEntry, MemoryLayer};

/// Wildcard principal present on every public pointer.
pub const PUBLIC_PRINCIPAL: &str = "*";

/// Principal standing for "any member of this sphere".
pub fn sphere_principal(sphere_id: &str) -> String {
    format!("sphere:{sphere_id}")
}

/// Index record describing where an entry lives and who may see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryIndexPointer {
    pub entry_id: String,
    pub source_sphere: Option<String>,
    pub layer: MemoryLayer,
    pub sensitivity: Sensitivity,
    pub permissions: BTreeSet<String>,
    pub content_hash: Option<String>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl MemoryIndexPointer {
    /// Derive a pointer from an entry: the author, explicit grants, `"*"`
    /// when public and `sphere:<id>` when sphere-scoped.
    pub fn from_entry(entry: &MemoryEntry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            source_sphere: entry.sphere_id.clone(),
            layer: entry.layer,
            sensitivity: entry.sensitivity,
            permissions: derive_permissions(entry),
            content_hash: entry.content.digest(),
            last_accessed: None,
        }
    }

    pub fn permits(&self, principal: &str) -> bool {
        self.permissions.contains(principal)
    }

    /// Refresh every derived field from `entry`, keeping `last_accessed`.
    fn resync(&mut self, entry: &MemoryEntry) {
        let last_accessed = self.last_accessed;
        *self = Self::from_entry(entry);
        self.last_accessed = last_accessed;
    }
}

fn derive_permissions(entry: &MemoryEntry) -> BTreeSet<String> {
    let mut permissions = BTreeSet::new();
    permissions.insert(entry.author_id.clone());
    permissions.extend(entry.shared_with.iter().cloned());
    if entry.sensitivity == Sensitivity::Public {
        permissions.insert(PUBLIC_PRINCIPAL.to_string());
    }
    if let Some(ref sphere_id) = entry.sphere_id {
        permissions.insert(sphere_principal(sphere_id));
    }
    permissions
}

/// Filters over pointers only. Never touches content.
#[derive(Debug, Clone, Default)]
pub struct IndexQuery {
    pub layer: Option<MemoryLayer>,
    pub sphere: Option<String>,
    pub sensitivity: Option<Sensitivity>,
    pub limit: Option<usize>,
}

impl IndexQuery {
    /// Query that matches all pointers.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: MemoryLayer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn in_sphere(mut self, sphere_id: &str) -> Self {
        self.sphere = Some(sphere_id.to_string());
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, p: &MemoryIndexPointer) -> bool {
        if let Some(layer) = self.layer {
            if p.layer != layer {
                return false;
            }
        }
        if let Some(ref sphere) = self.sphere {
            if p.source_sphere.as_deref() != Some(sphere.as_str()) {
                return false;
            }
        }
        if let Some(sensitivity) = self.sensitivity {
            if p.sensitivity != sensitivity {
                return false;
            }
        }
        true
    }
}

/// Ordered pointer collection with a version counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryIndex {
    pointers: Vec<MemoryIndexPointer>,
    version: u64,
    last_updated: DateTime<Utc>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            pointers: Vec::new(),
            version: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    /// Incremented once per pointer insert, update or removal.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Pointers in insertion order.
    pub fn pointers(&self) -> &[MemoryIndexPointer] {
        &self.pointers
    }

    pub fn get(&self, entry_id: &str) -> Option<&MemoryIndexPointer> {
        self.pointers.iter().find(|p| p.entry_id == entry_id)
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.get(entry_id).is_some()
    }

    pub fn entry_ids(&self) -> BTreeSet<&str> {
        self.pointers.iter().map(|p| p.entry_id.as_str()).collect()
    }

    /// Pointers matching `q`, in insertion order.
    pub fn query(&self, q: &IndexQuery) -> Vec<&MemoryIndexPointer> {
        let matches = self.pointers.iter().filter(|p| q.matches(p));
        match q.limit {
            Some(limit) => matches.take(limit).collect(),
            None => matches.collect(),
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        self.last_updated = Utc::now();
    }

    pub(crate) fn insert(&mut self, pointer: MemoryIndexPointer) {
        self.pointers.push(pointer);
        self.bump();
    }

    /// Resync the pointer of `entry`, inserting it if missing.
    pub(crate) fn sync(&mut self, entry: &MemoryEntry) {
        match self.pointers.iter_mut().find(|p| p.entry_id == entry.id) {
            Some(pointer) => pointer.resync(entry),
            None => self.pointers.push(MemoryIndexPointer::from_entry(entry)),
        }
        self.bump();
    }

    pub(crate) fn remove(&mut self, entry_id: &str) -> Option<MemoryIndexPointer> {
        let pos = self.pointers.iter().position(|p| p.entry_id == entry_id)?;
        let pointer = self.pointers.remove(pos);
        self.bump();
        Some(pointer)
    }

    /// Record a read. Does not change the version.
    pub(crate) fn touch(&mut self, entry_id: &str, at: DateTime<Utc>) {
        if let Some(pointer) = self.pointers.iter_mut().find(|p| p.entry_id == entry_id) {
            pointer.last_accessed = Some(at);
        }
    }

    /// Drop every pointer while keeping the version monotonic.
    pub(crate) fn clear(&mut self) {
        self.pointers.clear();
        self.bump();
    }

    pub(crate) fn raise_version_to(&mut self, version: u64) {
        self.version = self.version.max(version);
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::entry::MemoryContent;
    use sphere_state::ActorKind;

    fn entry(id: &str, sensitivity: Sensitivity, sphere: Option<&str>) -> MemoryEntry {
        MemoryEntry {
            id: id.into(),
            layer: MemoryLayer::SphereLocal,
            sphere_id: sphere.map(str::to_string),
            related_sphere_ids: Vec::new(),
            related_entity_ids: Vec::new(),
            timestamp: Utc::now(),
            author_kind: ActorKind::User,
            author_id: "u1".into(),
            content: MemoryContent::text("secret"),
            sensitivity,
            tags: BTreeSet::new(),
            shared_with: BTreeSet::new(),
            ttl_ms: None,
            version: 1,
        }
    }

    #[test]
    fn test_pointer_permissions_private() {
        let p = MemoryIndexPointer::from_entry(&entry("a", Sensitivity::Private, None));
        assert!(p.permits("u1"));
        assert!(!p.permits(PUBLIC_PRINCIPAL));
        assert_eq!(p.permissions.len(), 1);
    }

    #[test]
    fn test_pointer_permissions_public_sphere() {
        let p = MemoryIndexPointer::from_entry(&entry("a", Sensitivity::Public, Some("s1")));
        assert!(p.permits("u1"));
        assert!(p.permits(PUBLIC_PRINCIPAL));
        assert!(p.permits("sphere:s1"));
        assert_eq!(p.source_sphere.as_deref(), Some("s1"));
    }

    #[test]
    fn test_pointer_carries_no_content() {
        let p = MemoryIndexPointer::from_entry(&entry("a", Sensitivity::Private, None));
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("secret"));
        assert!(p.content_hash.is_some());
    }

    #[test]
    fn test_sync_keeps_last_accessed() {
        let mut idx = MemoryIndex::new();
        let mut e = entry("a", Sensitivity::Private, None);
        idx.insert(MemoryIndexPointer::from_entry(&e));
        let seen = Utc::now();
        idx.touch("a", seen);

        e.sensitivity = Sensitivity::Public;
        idx.sync(&e);
        let p = idx.get("a").unwrap();
        assert_eq!(p.sensitivity, Sensitivity::Public);
        assert_eq!(p.last_accessed, Some(seen));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn test_version_bumps_per_mutation() {
        let mut idx = MemoryIndex::new();
        idx.insert(MemoryIndexPointer::from_entry(&entry("a", Sensitivity::Private, None)));
        idx.insert(MemoryIndexPointer::from_entry(&entry("b", Sensitivity::Private, None)));
        assert_eq!(idx.version(), 2);
        idx.touch("a", Utc::now());
        assert_eq!(idx.version(), 2);
        idx.remove("a").unwrap();
        assert_eq!(idx.version(), 3);
        assert!(idx.remove("a").is_none());
        assert_eq!(idx.version(), 3);
    }

    #[test]
    fn test_query_filters() {
        let mut idx = MemoryIndex::new();
        idx.insert(MemoryIndexPointer::from_entry(&entry("a", Sensitivity::Public, Some("s1"))));
        idx.insert(MemoryIndexPointer::from_entry(&entry("b", Sensitivity::Private, Some("s1"))));
        idx.insert(MemoryIndexPointer::from_entry(&entry("c", Sensitivity::Private, Some("s2"))));

        assert_eq!(idx.query(&IndexQuery::all()).len(), 3);
        assert_eq!(idx.query(&IndexQuery::all().in_sphere("s1")).len(), 2);
        let private_s1 = idx.query(
            &IndexQuery::all()
                .in_sphere("s1")
                .with_sensitivity(Sensitivity::Private),
        );
        assert_eq!(private_s1.len(), 1);
        assert_eq!(private_s1[0].entry_id, "b");
        assert_eq!(idx.query(&IndexQuery::all().with_limit(1)).len(), 1);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut idx = MemoryIndex::new();
        idx.insert(MemoryIndexPointer::from_entry(&entry("x", Sensitivity::Restricted, None)));
        let json = serde_json::to_string(&idx).unwrap();
        let back: MemoryIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, idx);
    }
}
