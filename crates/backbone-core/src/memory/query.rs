//! Agent query engine: the only path through which agents read memory.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::entry::{ContentType, MemoryEntry, MemoryLayer};
use super::guard::{can_access_memory, is_purpose_allowed, AccessContext};
use super::redaction::{create_redacted_summary, AgentMemorySummary};
use super::store::MemoryStore;

/// A scoped agent query. Scopes are fixed by the caller that hands the
/// query to the agent; nothing in the pipeline widens them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentQuery {
    pub allowed_scopes: BTreeSet<MemoryLayer>,
    pub requested_sphere: Option<String>,
    /// Cap on emitted summaries. `None` means the caller default applies.
    pub max_results: Option<usize>,
    /// Entry must carry at least one of these tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Inclusive on both ends.
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    #[serde(default)]
    pub content_types: BTreeSet<ContentType>,
}

impl AgentQuery {
    pub fn scoped(layers: &[MemoryLayer]) -> Self {
        Self {
            allowed_scopes: layers.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn in_sphere(mut self, sphere_id: &str) -> Self {
        self.requested_sphere = Some(sphere_id.to_string());
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = Some((start, end));
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_types.insert(content_type);
        self
    }

    fn matches_filters(&self, entry: &MemoryEntry) -> bool {
        if !self.tags.is_empty() && self.tags.is_disjoint(&entry.tags) {
            return false;
        }
        if let Some((start, end)) = self.date_range {
            if entry.timestamp < start || entry.timestamp > end {
                return false;
            }
        }
        if !self.content_types.is_empty() && !self.content_types.contains(&entry.content_type()) {
            return false;
        }
        true
    }
}

/// Redacted answer to an [`AgentQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentQueryResult {
    pub summaries: Vec<AgentMemorySummary>,
    /// True when at least one in-scope entry was withheld.
    pub redactions_applied: bool,
    pub denied_entries_count: usize,
    /// In-scope pointers seen before the cap was reached.
    pub total_matches: usize,
    pub query_timestamp: DateTime<Utc>,
}

/// Run `query` for the agent described by `ctx`.
///
/// Walks the index in insertion order. Scope and sphere mismatches are
/// skipped silently; guard rejections are counted in
/// `denied_entries_count`, never returned as errors. Scanning stops once
/// `max_results` summaries have been emitted (or `default_max_results` when
/// the query sets no cap).
pub fn query_for_agent(
    store: &MemoryStore,
    query: &AgentQuery,
    ctx: &AccessContext,
    default_max_results: usize,
) -> AgentQueryResult {
    let max_results = query.max_results.unwrap_or(default_max_results);
    let mut summaries = Vec::new();
    let mut denied = 0usize;
    let mut matched = 0usize;

    for pointer in store.index().pointers() {
        if summaries.len() >= max_results {
            break;
        }
        if !query.allowed_scopes.contains(&pointer.layer) {
            continue;
        }
        if let Some(ref sphere) = query.requested_sphere {
            if pointer.source_sphere.as_deref() != Some(sphere.as_str()) {
                continue;
            }
        }
        matched += 1;

        if !can_access_memory(ctx, pointer) || !is_purpose_allowed(pointer.sensitivity, ctx.purpose)
        {
            denied += 1;
            continue;
        }

        let Ok(entry) = store.get_entry(&pointer.entry_id) else {
            warn!(
                event = "agent.query_dangling_pointer",
                entry_id = %pointer.entry_id,
                "index pointer without entry"
            );
            continue;
        };
        if !query.matches_filters(entry) {
            continue;
        }
        summaries.push(create_redacted_summary(entry, ctx.purpose));
    }

    AgentQueryResult {
        summaries,
        redactions_applied: denied > 0,
        denied_entries_count: denied,
        total_matches: matched,
        query_timestamp: Utc::now(),
    }
}
