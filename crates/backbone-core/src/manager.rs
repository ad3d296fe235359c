//! `MemoryManager`: the memory facade owned by the hosting process.
//!
//! Owns the entry store (with its index), the decision ledger and the
//! retention engine, and publishes a [`ChangeEvent`] after every committed
//! mutation. There is no global instance; construct one and pass it by
//! handle (see [`crate::SharedBackbone`] for the concurrent wrapper).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphere_state::{ChangeEvent, ChangeFeed, ChangeSource, DeferredPublish, HeldEvents};
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::BackboneConfig;
use crate::error::BackboneResult;
use crate::memory::{
    narrative_entry, query_for_agent, AccessContext, AgentQuery, AgentQueryResult, DecisionLedger,
    DecisionTrace, EntryPatch, LinkOptions, MemoryEntry, MemoryError, MemoryIndex, MemoryResult,
    MemoryStore, NewEntry, RetentionEngine, RetentionReport,
};
use crate::metrics::METRICS;
use crate::obs::{self, StoreSpan};

/// Full memory state for the backup boundary.
///
/// On import `index` is optional: pointers are always rebuilt from
/// `entries`, and a supplied index only contributes `last_accessed`
/// timestamps and a version floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub entries: Vec<MemoryEntry>,
    #[serde(default)]
    pub index: Option<MemoryIndex>,
    #[serde(default)]
    pub decision_ledger: Option<Vec<DecisionTrace>>,
}

impl MemorySnapshot {
    /// # Errors
    ///
    /// Returns `MemoryError::InvalidSnapshot` for duplicate entry or trace
    /// ids, or an invalid trace.
    pub fn validate(&self) -> MemoryResult<()> {
        let mut ids = HashSet::new();
        for entry in &self.entries {
            if !ids.insert(entry.id.as_str()) {
                return Err(MemoryError::InvalidSnapshot(format!(
                    "duplicate entry id {}",
                    entry.id
                )));
            }
        }
        let mut trace_ids = HashSet::new();
        for trace in self.decision_ledger.iter().flatten() {
            trace
                .validate()
                .map_err(|e| MemoryError::InvalidSnapshot(e.to_string()))?;
            if !trace_ids.insert(trace.id.as_str()) {
                return Err(MemoryError::InvalidSnapshot(format!(
                    "duplicate decision trace id {}",
                    trace.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryManager {
    store: MemoryStore,
    ledger: DecisionLedger,
    retention: RetentionEngine,
    default_max_results: usize,
    revision: u64,
    feed: ChangeFeed,
    held: HeldEvents,
}

impl Default for MemoryManager {
    fn default() -> Self {
        let config = BackboneConfig::default();
        let feed = ChangeFeed::new(config.notifications.channel_capacity);
        Self::assemble(&config, feed)
    }
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `BackboneError::Config` if `config` fails validation.
    pub fn from_config(config: &BackboneConfig) -> BackboneResult<Self> {
        Self::with_feed(
            config,
            ChangeFeed::new(config.notifications.channel_capacity),
        )
    }

    /// Create a manager publishing into an existing feed.
    ///
    /// # Errors
    ///
    /// Returns `BackboneError::Config` if `config` fails validation.
    pub fn with_feed(config: &BackboneConfig, feed: ChangeFeed) -> BackboneResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, feed))
    }

    pub(crate) fn assemble(config: &BackboneConfig, feed: ChangeFeed) -> Self {
        Self {
            store: MemoryStore::new(),
            ledger: DecisionLedger::new(),
            retention: RetentionEngine::new(config.retention.clone()),
            default_max_results: config.query.default_max_results,
            revision: 0,
            feed,
            held: HeldEvents::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Count of committed mutations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn index(&self) -> &MemoryIndex {
        self.store.index()
    }

    pub fn ledger(&self) -> &DecisionLedger {
        &self.ledger
    }

    pub fn retention(&self) -> &RetentionEngine {
        &self.retention
    }

    fn commit(&mut self, source: ChangeSource) {
        self.revision += 1;
        let event = ChangeEvent {
            source,
            revision: self.revision,
        };
        self.held.publish_or_hold(&self.feed, event);
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    pub fn add_entry(&mut self, new: NewEntry) -> MemoryResult<MemoryEntry> {
        let entry = self.store.add_entry(new)?;
        METRICS.inc_entries_written();
        obs::emit_entry_added(&entry.id, entry.layer);
        self.commit(ChangeSource::Memory);
        Ok(entry)
    }

    pub fn get_entry(&self, id: &str) -> MemoryResult<&MemoryEntry> {
        self.store.get_entry(id)
    }

    pub fn update_entry(&mut self, id: &str, patch: EntryPatch) -> MemoryResult<MemoryEntry> {
        let entry = self.store.update_entry(id, patch)?;
        METRICS.inc_entries_written();
        obs::emit_entry_updated(&entry.id, entry.version);
        self.commit(ChangeSource::Memory);
        Ok(entry)
    }

    pub fn delete_entry(&mut self, id: &str) -> MemoryResult<MemoryEntry> {
        let entry = self.store.delete_entry(id)?;
        obs::emit_entry_deleted(&entry.id, entry.layer);
        self.commit(ChangeSource::Memory);
        Ok(entry)
    }

    /// Grant `principal` access. Granting an existing grant commits nothing.
    pub fn grant_access(&mut self, id: &str, principal: &str) -> MemoryResult<MemoryEntry> {
        let (entry, changed) = self.store.grant_access(id, principal)?;
        if changed {
            obs::emit_access_changed(id, principal, true);
            self.commit(ChangeSource::Memory);
        }
        Ok(entry)
    }

    pub fn revoke_access(&mut self, id: &str, principal: &str) -> MemoryResult<MemoryEntry> {
        let (entry, changed) = self.store.revoke_access(id, principal)?;
        if changed {
            obs::emit_access_changed(id, principal, false);
            self.commit(ChangeSource::Memory);
        }
        Ok(entry)
    }

    /// Guarded single-entry read for users and system jobs. Agents must use
    /// [`MemoryManager::query_for_agent`].
    pub fn read_entry(&mut self, ctx: &AccessContext, id: &str) -> MemoryResult<MemoryEntry> {
        match self.store.read_entry(ctx, id) {
            Ok(entry) => Ok(entry.clone()),
            Err(err) => {
                if let MemoryError::AccessDenied { ref reason, .. } = err {
                    METRICS.add_access_denials(1);
                    obs::emit_access_denied(&ctx.requester_id, id, reason);
                }
                Err(err)
            }
        }
    }

    pub fn link_cross_sphere(&mut self, entry_ids: &[&str], reason: &str) -> MemoryResult<MemoryEntry> {
        self.link_cross_sphere_with(entry_ids, reason, LinkOptions::default())
    }

    pub fn link_cross_sphere_with(
        &mut self,
        entry_ids: &[&str],
        reason: &str,
        options: LinkOptions,
    ) -> MemoryResult<MemoryEntry> {
        let link = self.store.link_cross_sphere_with(entry_ids, reason, options)?;
        METRICS.inc_entries_written();
        obs::emit_cross_sphere_linked(&link.id, link.related_entity_ids.len());
        self.commit(ChangeSource::Memory);
        Ok(link)
    }

    pub fn get_cross_sphere_links(&self, entry_id: &str) -> Vec<&MemoryEntry> {
        self.store.get_cross_sphere_links(entry_id)
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Run a redacted agent query. Denials are counted, never raised.
    pub fn query_for_agent(&self, query: &AgentQuery, ctx: &AccessContext) -> AgentQueryResult {
        let result = query_for_agent(&self.store, query, ctx, self.default_max_results);
        METRICS.inc_agent_queries();
        METRICS.add_access_denials(result.denied_entries_count as u64);
        obs::emit_agent_query(
            &ctx.requester_id,
            ctx.purpose,
            result.summaries.len(),
            result.denied_entries_count,
            result.total_matches,
        );
        result
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// Append `trace` to the ledger and mirror it into the narrative layer.
    /// Returns the narrative entry.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::InvalidDecision` for an invalid trace and
    /// `MemoryError::AlreadyExists` for a trace id already in the ledger.
    /// Nothing is written in either case.
    pub fn add_decision_trace(&mut self, trace: DecisionTrace) -> MemoryResult<MemoryEntry> {
        trace.validate()?;
        if self.ledger.get(&trace.id).is_some() {
            return Err(MemoryError::AlreadyExists { id: trace.id });
        }
        let entry = self.store.add_entry(narrative_entry(&trace))?;
        let trace_id = trace.id.clone();
        let confidence = trace.confidence;
        if let Err(err) = self.ledger.append(trace) {
            self.store.delete_entry(&entry.id)?;
            return Err(err);
        }
        METRICS.inc_entries_written();
        METRICS.inc_decisions_recorded();
        obs::emit_decision_recorded(&trace_id, &entry.id, confidence);
        self.commit(ChangeSource::Ledger);
        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------------

    pub fn get_expired_entries(&self, now: DateTime<Utc>) -> Vec<String> {
        self.retention.expired_entries(&self.store, now)
    }

    pub fn run_cleanup(&mut self) -> RetentionReport {
        self.run_cleanup_at(Utc::now())
    }

    /// Delete every expired entry through the normal delete path.
    pub fn run_cleanup_at(&mut self, now: DateTime<Utc>) -> RetentionReport {
        let _span = StoreSpan::enter("run_cleanup");
        let mut removed_ids = Vec::new();
        for id in self.get_expired_entries(now) {
            match self.store.delete_entry(&id) {
                Ok(entry) => {
                    obs::emit_entry_deleted(&entry.id, entry.layer);
                    removed_ids.push(entry.id);
                }
                Err(err) => warn!(
                    event = "memory.retention_skip",
                    entry_id = %id,
                    error = %err,
                    "expired entry could not be deleted"
                ),
            }
        }
        let removed_count = removed_ids.len();
        if removed_count > 0 {
            METRICS.add_entries_forgotten(removed_count as u64);
            self.commit(ChangeSource::Memory);
        }
        let remaining_count = self.store.len();
        obs::emit_retention_cleanup(removed_count, remaining_count);
        RetentionReport {
            removed_ids,
            removed_count,
            remaining_count,
        }
    }

    // -----------------------------------------------------------------------
    // Backup
    // -----------------------------------------------------------------------

    pub fn export(&self) -> MemorySnapshot {
        MemorySnapshot {
            entries: self.store.entries().into_iter().cloned().collect(),
            index: Some(self.store.index().clone()),
            decision_ledger: Some(self.ledger.traces().to_vec()),
        }
    }

    /// Replace all memory state with `snapshot`. Not a merge.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::InvalidSnapshot` if the snapshot fails
    /// validation; existing state is left untouched in that case.
    pub fn import(&mut self, snapshot: MemorySnapshot) -> MemoryResult<()> {
        snapshot.validate()?;
        let entries = snapshot.entries.len();
        let traces = snapshot.decision_ledger.unwrap_or_default();
        let trace_count = traces.len();
        self.store.replace_all(snapshot.entries, snapshot.index.as_ref());
        self.ledger.replace_all(traces);
        obs::emit_memory_imported(entries, trace_count);
        self.commit(ChangeSource::Memory);
        Ok(())
    }
}

impl DeferredPublish for MemoryManager {
    fn hold_events(&mut self) {
        self.held.hold();
    }

    fn take_held_events(&mut self) -> Vec<ChangeEvent> {
        self.held.take()
    }
}
