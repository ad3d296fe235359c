//! Structured observability hooks for memory lifecycle events.
//!
//! Events are emitted with an `event` field so log pipelines can filter on
//! it. Only ids, layers and counts are ever logged, never content.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::memory::{AccessPurpose, MemoryLayer};

/// RAII guard that enters an operation-scoped span.
///
/// ```ignore
/// let _span = StoreSpan::enter("run_cleanup");
/// // events below carry op = "run_cleanup"
/// ```
pub struct StoreSpan {
    _span: tracing::span::EnteredSpan,
}

impl StoreSpan {
    pub fn enter(op: &str) -> Self {
        let span = tracing::info_span!("backbone.op", op = %op);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_entry_added(entry_id: &str, layer: MemoryLayer) {
    info!(event = "memory.entry_added", entry_id = %entry_id, layer = %layer);
}

pub fn emit_entry_updated(entry_id: &str, version: u64) {
    debug!(event = "memory.entry_updated", entry_id = %entry_id, version = version);
}

pub fn emit_entry_deleted(entry_id: &str, layer: MemoryLayer) {
    info!(event = "memory.entry_deleted", entry_id = %entry_id, layer = %layer);
}

pub fn emit_access_changed(entry_id: &str, principal: &str, granted: bool) {
    info!(
        event = "memory.access_changed",
        entry_id = %entry_id,
        principal = %principal,
        granted = granted,
    );
}

pub fn emit_cross_sphere_linked(link_id: &str, linked: usize) {
    info!(event = "memory.cross_sphere_linked", link_id = %link_id, linked = linked);
}

/// Emit event: an agent query finished.
pub fn emit_agent_query(
    requester_id: &str,
    purpose: AccessPurpose,
    returned: usize,
    denied: usize,
    matched: usize,
) {
    info!(
        event = "agent.query",
        requester_id = %requester_id,
        purpose = %purpose,
        returned = returned,
        denied = denied,
        matched = matched,
    );
}

/// Emit event: a targeted read was refused (warning level).
pub fn emit_access_denied(requester_id: &str, entry_id: &str, reason: &dyn std::fmt::Display) {
    warn!(
        event = "memory.access_denied",
        requester_id = %requester_id,
        entry_id = %entry_id,
        reason = %reason,
    );
}

pub fn emit_decision_recorded(trace_id: &str, entry_id: &str, confidence: f64) {
    info!(
        event = "decision.recorded",
        trace_id = %trace_id,
        entry_id = %entry_id,
        confidence = confidence,
    );
}

pub fn emit_retention_cleanup(removed: usize, remaining: usize) {
    info!(event = "retention.cleanup", removed = removed, remaining = remaining);
}

pub fn emit_memory_imported(entries: usize, traces: usize) {
    info!(event = "memory.imported", entries = entries, traces = traces);
}

/// Emit event: lock acquisition gave up (warning level).
pub fn emit_lock_timeout(store: &str, waited: Duration) {
    warn!(
        event = "lock.timeout",
        store = %store,
        waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_store_span_create() {
        let _span = StoreSpan::enter("test-op");
    }

    #[traced_test]
    #[test]
    fn test_events_carry_event_field() {
        emit_entry_added("sphere_local-1-abc", MemoryLayer::SphereLocal);
        emit_retention_cleanup(2, 5);
        assert!(logs_contain("memory.entry_added"));
        assert!(logs_contain("sphere_local-1-abc"));
        assert!(logs_contain("retention.cleanup"));
    }
}
