//! Memory store: entry CRUD that keeps the index in lockstep.
//!
//! Every mutation touches the entry map and the index inside the same
//! `&mut self` call, so no reader can observe an entry without its pointer
//! or a pointer without its entry.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sphere_state::{ActorKind, Sensitivity};
use uuid::Uuid;

use super::entry::{EntryPatch, MemoryContent, MemoryEntry, MemoryLayer, NewEntry};
use super::error::{MemoryError, MemoryResult};
use super::guard::{evaluate_access, AccessContext, AccessVerdict};
use super::index::{MemoryIndex, MemoryIndexPointer};

/// Options for [`MemoryStore::link_cross_sphere_with`].
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub author_kind: ActorKind,
    pub author_id: String,
    pub sensitivity: Sensitivity,
    pub tags: BTreeSet<String>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            author_kind: ActorKind::System,
            author_id: "system".to_string(),
            sensitivity: Sensitivity::Restricted,
            tags: BTreeSet::new(),
        }
    }
}

impl LinkOptions {
    pub fn authored_by(mut self, kind: ActorKind, author_id: &str) -> Self {
        self.author_kind = kind;
        self.author_id = author_id.to_string();
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }
}

/// Full entry content plus the pointer index describing it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, MemoryEntry>,
    index: MemoryIndex,
}

fn entry_id(layer: MemoryLayer, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{layer}-{}-{}", at.timestamp_millis(), &suffix[..8])
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> &MemoryIndex {
        &self.index
    }

    pub fn get_entry(&self, id: &str) -> MemoryResult<&MemoryEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All entries, oldest first, ties broken by id.
    pub fn entries(&self) -> Vec<&MemoryEntry> {
        let mut all: Vec<&MemoryEntry> = self.entries.values().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn entries_in_layer(&self, layer: MemoryLayer) -> Vec<&MemoryEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.layer == layer)
            .collect()
    }

    pub fn entries_for_sphere(&self, sphere_id: &str) -> Vec<&MemoryEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.sphere_id.as_deref() == Some(sphere_id))
            .collect()
    }

    /// Store a new entry and append its pointer.
    pub fn add_entry(&mut self, new: NewEntry) -> MemoryResult<MemoryEntry> {
        let timestamp = new.timestamp.unwrap_or_else(Utc::now);
        let id = entry_id(new.layer, timestamp);
        if self.entries.contains_key(&id) {
            return Err(MemoryError::AlreadyExists { id });
        }
        let entry = MemoryEntry {
            id: id.clone(),
            layer: new.layer,
            sphere_id: new.sphere_id,
            related_sphere_ids: new.related_sphere_ids,
            related_entity_ids: new.related_entity_ids,
            timestamp,
            author_kind: new.author_kind,
            author_id: new.author_id,
            content: new.content,
            sensitivity: new.sensitivity,
            tags: new.tags,
            shared_with: BTreeSet::new(),
            ttl_ms: new.ttl_ms,
            version: 1,
        };
        self.index.insert(MemoryIndexPointer::from_entry(&entry));
        self.entries.insert(id, entry.clone());
        Ok(entry)
    }

    /// Apply `patch`, bump the entry version and resync its pointer.
    pub fn update_entry(&mut self, id: &str, patch: EntryPatch) -> MemoryResult<MemoryEntry> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })?;
        if let Some(content) = patch.content {
            entry.content = content;
        }
        if let Some(ids) = patch.related_sphere_ids {
            entry.related_sphere_ids = ids;
        }
        if let Some(ids) = patch.related_entity_ids {
            entry.related_entity_ids = ids;
        }
        if let Some(sensitivity) = patch.sensitivity {
            entry.sensitivity = sensitivity;
        }
        if let Some(tags) = patch.tags {
            entry.tags = tags;
        }
        if let Some(ttl_ms) = patch.ttl_ms {
            entry.ttl_ms = ttl_ms;
        }
        entry.version += 1;
        let updated = entry.clone();
        self.index.sync(&updated);
        Ok(updated)
    }

    /// Remove the entry and its pointer together.
    pub fn delete_entry(&mut self, id: &str) -> MemoryResult<MemoryEntry> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })?;
        self.index.remove(id);
        Ok(entry)
    }

    /// Add `principal` (user id or role) to the entry's permissions.
    ///
    /// The flag is `false` when the principal already held a grant; the
    /// entry is then left untouched.
    pub fn grant_access(&mut self, id: &str, principal: &str) -> MemoryResult<(MemoryEntry, bool)> {
        self.edit_grants(id, |grants| grants.insert(principal.to_string()))
    }

    /// Remove an explicit grant. The author always keeps access.
    pub fn revoke_access(&mut self, id: &str, principal: &str) -> MemoryResult<(MemoryEntry, bool)> {
        self.edit_grants(id, |grants| grants.remove(principal))
    }

    fn edit_grants(
        &mut self,
        id: &str,
        edit: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> MemoryResult<(MemoryEntry, bool)> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })?;
        if !edit(&mut entry.shared_with) {
            return Ok((entry.clone(), false));
        }
        entry.version += 1;
        let updated = entry.clone();
        self.index.sync(&updated);
        Ok((updated, true))
    }

    /// Guarded single-entry read for users and system jobs.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::AccessDenied` for agent requesters (agents read
    /// through the query engine only) and for guard rejections.
    pub fn read_entry(&mut self, ctx: &AccessContext, id: &str) -> MemoryResult<&MemoryEntry> {
        if ctx.requester_kind == ActorKind::Agent {
            return Err(MemoryError::AccessDenied {
                entry_id: id.into(),
                reason: "agents read memory through the query engine".into(),
            });
        }
        let pointer = self
            .index
            .get(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })?;
        if let AccessVerdict::Denied(reason) = evaluate_access(ctx, pointer) {
            return Err(MemoryError::AccessDenied {
                entry_id: id.into(),
                reason: reason.to_string(),
            });
        }
        self.index.touch(id, ctx.timestamp);
        self.get_entry(id)
    }

    /// Link two or more existing entries through a new restricted
    /// `cross_sphere` entry authored by the system.
    pub fn link_cross_sphere(&mut self, entry_ids: &[&str], reason: &str) -> MemoryResult<MemoryEntry> {
        self.link_cross_sphere_with(entry_ids, reason, LinkOptions::default())
    }

    /// # Errors
    ///
    /// Returns `MemoryError::InvalidLink` for fewer than two distinct ids and
    /// `MemoryError::EntryNotFound` for an unknown id.
    pub fn link_cross_sphere_with(
        &mut self,
        entry_ids: &[&str],
        reason: &str,
        options: LinkOptions,
    ) -> MemoryResult<MemoryEntry> {
        let mut linked: Vec<&str> = Vec::new();
        for id in entry_ids {
            if !linked.contains(id) {
                linked.push(*id);
            }
        }
        if linked.len() < 2 {
            return Err(MemoryError::InvalidLink(format!(
                "need at least two distinct entries, got {}",
                linked.len()
            )));
        }

        let mut spheres: Vec<String> = Vec::new();
        for id in &linked {
            let entry = self.get_entry(id)?;
            for sphere in entry
                .sphere_id
                .iter()
                .chain(entry.related_sphere_ids.iter())
            {
                if !spheres.contains(sphere) {
                    spheres.push(sphere.clone());
                }
            }
        }
        let spheres: Vec<&str> = spheres.iter().map(String::as_str).collect();

        let content = MemoryContent::Reference {
            linked_entry_ids: linked.iter().map(|s| s.to_string()).collect(),
            reason: reason.to_string(),
        };
        let mut new = NewEntry::new(
            MemoryLayer::CrossSphere,
            options.author_kind,
            &options.author_id,
            content,
        )
        .with_sensitivity(options.sensitivity)
        .related_to_spheres(&spheres)
        .related_to_entities(&linked);
        new.tags = options.tags;
        self.add_entry(new)
    }

    /// Cross-sphere link entries that reference `entry_id`, oldest first.
    pub fn get_cross_sphere_links(&self, entry_id: &str) -> Vec<&MemoryEntry> {
        self.entries_in_layer(MemoryLayer::CrossSphere)
            .into_iter()
            .filter(|e| e.related_entity_ids.iter().any(|id| id == entry_id))
            .collect()
    }

    /// Replace all state with `entries`, rebuilding pointers from them.
    /// `last_accessed` is carried over from `previous` where ids match and
    /// the index version never goes backwards.
    pub(crate) fn replace_all(&mut self, entries: Vec<MemoryEntry>, previous: Option<&MemoryIndex>) {
        self.entries.clear();
        self.index.clear();
        for entry in entries {
            let mut pointer = MemoryIndexPointer::from_entry(&entry);
            pointer.last_accessed = previous
                .and_then(|idx| idx.get(&entry.id))
                .and_then(|p| p.last_accessed);
            self.index.insert(pointer);
            self.entries.insert(entry.id.clone(), entry);
        }
        if let Some(previous) = previous {
            self.index.raise_version_to(previous.version());
        }
    }
}
