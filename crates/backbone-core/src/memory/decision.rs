//! Decision ledger: append-only traces of consequential choices.
//!
//! Each appended trace is also mirrored into the narrative layer (see
//! [`narrative_entry`]) so decisions are read through the same guarded path
//! as any other memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphere_state::{ActorKind, Sensitivity};
use uuid::Uuid;

use super::entry::{MemoryContent, MemoryLayer, NewEntry};
use super::error::{MemoryError, MemoryResult};

/// Tag carried by every narrative entry mirrored from a trace.
pub const DECISION_TAG: &str = "decision";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Immutable audit record of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub id: String,
    pub label: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// Memory entries the decision was based on.
    pub input_entry_ids: Vec<String>,
    /// Identifiers of the actions the decision produced.
    pub output_actions: Vec<String>,
    pub rationale: String,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub decided_by: ActorKind,
    pub agent_id: Option<String>,
    pub sphere_context: Option<String>,
    pub impact: ImpactLevel,
}

impl DecisionTrace {
    pub fn new(label: &str, rationale: &str, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            description: String::new(),
            timestamp: Utc::now(),
            input_entry_ids: Vec::new(),
            output_actions: Vec::new(),
            rationale: rationale.to_string(),
            confidence,
            decided_by: ActorKind::System,
            agent_id: None,
            sphere_context: None,
            impact: ImpactLevel::Low,
        }
    }

    pub fn described_as(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_inputs(mut self, entry_ids: &[&str]) -> Self {
        self.input_entry_ids = entry_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_outputs(mut self, actions: &[&str]) -> Self {
        self.output_actions = actions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn decided_by_agent(mut self, agent_id: &str) -> Self {
        self.decided_by = ActorKind::Agent;
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn decided_by(mut self, kind: ActorKind) -> Self {
        self.decided_by = kind;
        self
    }

    pub fn in_sphere(mut self, sphere_id: &str) -> Self {
        self.sphere_context = Some(sphere_id.to_string());
        self
    }

    pub fn with_impact(mut self, impact: ImpactLevel) -> Self {
        self.impact = impact;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// # Errors
    ///
    /// Returns `MemoryError::InvalidDecision` for an empty id or label, or a
    /// confidence outside `[0.0, 1.0]`.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.id.trim().is_empty() {
            return Err(MemoryError::InvalidDecision("id must not be empty".into()));
        }
        if self.label.trim().is_empty() {
            return Err(MemoryError::InvalidDecision("label must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MemoryError::InvalidDecision(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Principal recorded as author of the mirrored narrative entry.
    pub fn author_id(&self) -> String {
        self.agent_id
            .clone()
            .unwrap_or_else(|| self.decided_by.to_string())
    }
}

/// Build the private narrative entry wrapping `trace`.
pub fn narrative_entry(trace: &DecisionTrace) -> NewEntry {
    let inputs: Vec<&str> = trace.input_entry_ids.iter().map(String::as_str).collect();
    let mut entry = NewEntry::new(
        MemoryLayer::Narrative,
        trace.decided_by,
        &trace.author_id(),
        MemoryContent::Decision {
            trace: trace.clone(),
        },
    )
    .with_sensitivity(Sensitivity::Private)
    .with_tag(DECISION_TAG)
    .related_to_entities(&inputs)
    .at(trace.timestamp);
    if let Some(ref sphere_id) = trace.sphere_context {
        entry = entry.in_sphere(sphere_id);
    }
    entry
}

/// Ordered, append-only list of decision traces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionLedger {
    traces: Vec<DecisionTrace>,
}

impl DecisionLedger {
    pub fn new() -> Self {
        Self { traces: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// All traces in append order.
    pub fn traces(&self) -> &[DecisionTrace] {
        &self.traces
    }

    pub fn get(&self, id: &str) -> Option<&DecisionTrace> {
        self.traces.iter().find(|t| t.id == id)
    }

    /// Validate and append. Traces are never modified once appended.
    pub(crate) fn append(&mut self, trace: DecisionTrace) -> MemoryResult<()> {
        trace.validate()?;
        if self.get(&trace.id).is_some() {
            return Err(MemoryError::AlreadyExists { id: trace.id });
        }
        self.traces.push(trace);
        Ok(())
    }

    /// Traces with `start <= timestamp <= end`.
    pub fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&DecisionTrace> {
        self.traces
            .iter()
            .filter(|t| t.timestamp >= start && t.timestamp <= end)
            .collect()
    }

    pub fn by_agent(&self, agent_id: &str) -> Vec<&DecisionTrace> {
        self.traces
            .iter()
            .filter(|t| t.agent_id.as_deref() == Some(agent_id))
            .collect()
    }

    pub fn by_sphere(&self, sphere_id: &str) -> Vec<&DecisionTrace> {
        self.traces
            .iter()
            .filter(|t| t.sphere_context.as_deref() == Some(sphere_id))
            .collect()
    }

    pub fn high_impact(&self) -> Vec<&DecisionTrace> {
        self.traces
            .iter()
            .filter(|t| t.impact == ImpactLevel::High)
            .collect()
    }

    pub(crate) fn replace_all(&mut self, traces: Vec<DecisionTrace>) {
        self.traces = traces;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_confidence_validation() {
        assert!(DecisionTrace::new("ok", "r", 0.0).validate().is_ok());
        assert!(DecisionTrace::new("ok", "r", 1.0).validate().is_ok());
        assert!(DecisionTrace::new("bad", "r", 1.01).validate().is_err());
        assert!(DecisionTrace::new("bad", "r", -0.1).validate().is_err());
        assert!(DecisionTrace::new("bad", "r", f64::NAN).validate().is_err());
        assert!(DecisionTrace::new(" ", "r", 0.5).validate().is_err());
    }

    #[test]
    fn test_append_rejects_duplicates() {
        let mut ledger = DecisionLedger::new();
        let trace = DecisionTrace::new("pay", "due", 0.9);
        ledger.append(trace.clone()).unwrap();
        let err = ledger.append(trace).unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyExists { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_filters() {
        let mut ledger = DecisionLedger::new();
        let now = Utc::now();
        ledger
            .append(
                DecisionTrace::new("a", "r", 0.5)
                    .decided_by_agent("planner")
                    .in_sphere("biz-1")
                    .with_impact(ImpactLevel::High)
                    .at(now - Duration::days(2)),
            )
            .unwrap();
        ledger
            .append(DecisionTrace::new("b", "r", 0.5).decided_by_agent("coach").at(now))
            .unwrap();

        assert_eq!(ledger.by_agent("planner").len(), 1);
        assert_eq!(ledger.by_sphere("biz-1").len(), 1);
        assert_eq!(ledger.high_impact()[0].label, "a");
        assert_eq!(ledger.in_range(now - Duration::days(1), now).len(), 1);
        assert_eq!(ledger.in_range(now - Duration::days(3), now).len(), 2);
    }

    #[test]
    fn test_narrative_entry_shape() {
        let trace = DecisionTrace::new("rebalance", "drift", 0.7)
            .decided_by_agent("advisor")
            .with_inputs(&["e1", "e2"])
            .in_sphere("biz-1");
        let entry = narrative_entry(&trace);
        assert_eq!(entry.layer, MemoryLayer::Narrative);
        assert_eq!(entry.sensitivity, Sensitivity::Private);
        assert_eq!(entry.author_id, "advisor");
        assert_eq!(entry.author_kind, ActorKind::Agent);
        assert_eq!(entry.sphere_id.as_deref(), Some("biz-1"));
        assert_eq!(entry.related_entity_ids, vec!["e1", "e2"]);
        assert!(entry.tags.contains(DECISION_TAG));
        assert_eq!(entry.timestamp, Some(trace.timestamp));
    }
}
