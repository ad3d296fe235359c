//! Global atomic counters for backbone observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    entries_written: AtomicU64,
    agent_queries: AtomicU64,
    access_denials: AtomicU64,
    entries_forgotten: AtomicU64,
    decisions_recorded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            entries_written: AtomicU64::new(0),
            agent_queries: AtomicU64::new(0),
            access_denials: AtomicU64::new(0),
            entries_forgotten: AtomicU64::new(0),
            decisions_recorded: AtomicU64::new(0),
        }
    }

    pub fn inc_entries_written(&self) {
        self.entries_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_agent_queries(&self) {
        self.agent_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` denials (a single agent query may deny many entries).
    pub fn add_access_denials(&self, n: u64) {
        self.access_denials.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_entries_forgotten(&self, n: u64) {
        self.entries_forgotten.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_decisions_recorded(&self) {
        self.decisions_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            entries_written = self.entries_written(),
            agent_queries = self.agent_queries(),
            access_denials = self.access_denials(),
            entries_forgotten = self.entries_forgotten(),
            decisions_recorded = self.decisions_recorded(),
        );
    }

    pub fn entries_written(&self) -> u64 {
        self.entries_written.load(Ordering::Relaxed)
    }

    pub fn agent_queries(&self) -> u64 {
        self.agent_queries.load(Ordering::Relaxed)
    }

    pub fn access_denials(&self) -> u64 {
        self.access_denials.load(Ordering::Relaxed)
    }

    pub fn entries_forgotten(&self) -> u64 {
        self.entries_forgotten.load(Ordering::Relaxed)
    }

    pub fn decisions_recorded(&self) -> u64 {
        self.decisions_recorded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.entries_written.store(0, Ordering::Relaxed);
        self.agent_queries.store(0, Ordering::Relaxed);
        self.access_denials.store(0, Ordering::Relaxed);
        self.entries_forgotten.store(0, Ordering::Relaxed);
        self.decisions_recorded.store(0, Ordering::Relaxed);
    }
}
