//! Retention: decides which entries are eligible for forgetting.
//!
//! The engine only computes ids. Deletion goes through the normal store
//! path so the index stays consistent.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DECISION_TAG;
use super::entry::{MemoryEntry, MemoryLayer};
use super::store::MemoryStore;

/// Per-layer forgetting policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    pub layer: MemoryLayer,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub exempt_tags: BTreeSet<String>,
    /// Lower values are evaluated first.
    #[serde(default)]
    pub priority: u32,
}

impl RetentionRule {
    pub fn new(layer: MemoryLayer, priority: u32) -> Self {
        Self {
            layer,
            max_age_days: None,
            max_entries: None,
            exempt_tags: BTreeSet::new(),
            priority,
        }
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn exempting(mut self, tags: &[&str]) -> Self {
        self.exempt_tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_days.map(|d| Duration::days(i64::from(d)))
    }

    pub fn is_exempt(&self, entry: &MemoryEntry) -> bool {
        !self.exempt_tags.is_disjoint(&entry.tags)
    }

    fn is_too_old(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> bool {
        self.max_age().is_some_and(|max| entry.age_at(now) > max)
    }
}

/// Default rule set. `collective` has no rule and `archive` never expires
/// by age.
pub fn default_rules() -> Vec<RetentionRule> {
    vec![
        RetentionRule::new(MemoryLayer::SphereLocal, 1).with_max_age_days(90),
        RetentionRule::new(MemoryLayer::CrossSphere, 2).with_max_age_days(180),
        RetentionRule::new(MemoryLayer::Narrative, 3)
            .with_max_age_days(365)
            .exempting(&["important", "milestone", DECISION_TAG]),
        RetentionRule::new(MemoryLayer::Archive, 4),
    ]
}

/// Summary of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub removed_ids: Vec<String>,
    pub removed_count: usize,
    pub remaining_count: usize,
}

/// Evaluates [`RetentionRule`]s against a store.
#[derive(Debug, Clone)]
pub struct RetentionEngine {
    rules: Vec<RetentionRule>,
}

impl Default for RetentionEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RetentionEngine {
    /// Rules are kept sorted by ascending priority (stable for ties).
    pub fn new(mut rules: Vec<RetentionRule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    pub fn rules(&self) -> &[RetentionRule] {
        &self.rules
    }

    /// First rule (by priority) targeting `layer`.
    pub fn rule_for(&self, layer: MemoryLayer) -> Option<&RetentionRule> {
        self.rules.iter().find(|r| r.layer == layer)
    }

    /// Ids eligible for forgetting at `now`.
    ///
    /// Entries past their own TTL come first, regardless of tags. Then each
    /// rule, in priority order, contributes entries older than its max age
    /// and, when `max_entries` is set, the oldest remaining non-exempt
    /// entries beyond that count. Exempt entries still count toward
    /// `max_entries` but are never selected.
    pub fn expired_entries(&self, store: &MemoryStore, now: DateTime<Utc>) -> Vec<String> {
        let entries = store.entries();
        let mut expired: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for entry in &entries {
            if entry.is_ttl_expired_at(now) {
                seen.insert(&entry.id);
                expired.push(entry.id.clone());
            }
        }

        let mut handled: HashSet<MemoryLayer> = HashSet::new();
        for rule in &self.rules {
            if !handled.insert(rule.layer) {
                continue;
            }
            let in_layer: Vec<&MemoryEntry> = entries
                .iter()
                .copied()
                .filter(|e| e.layer == rule.layer && !seen.contains(e.id.as_str()))
                .collect();

            let mut survivors: Vec<&MemoryEntry> = Vec::new();
            for entry in in_layer {
                if rule.is_too_old(entry, now) && !rule.is_exempt(entry) {
                    seen.insert(&entry.id);
                    expired.push(entry.id.clone());
                } else {
                    survivors.push(entry);
                }
            }

            if let Some(max) = rule.max_entries {
                let mut excess = survivors.len().saturating_sub(max);
                // `entries()` is oldest first with an id tiebreak.
                for entry in survivors {
                    if excess == 0 {
                        break;
                    }
                    if rule.is_exempt(entry) {
                        continue;
                    }
                    seen.insert(&entry.id);
                    expired.push(entry.id.clone());
                    excess -= 1;
                }
            }
        }
        expired
    }
}
