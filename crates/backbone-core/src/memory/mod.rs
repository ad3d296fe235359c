//! Memory subsystem: layered entries, their content-free index, access
//! guard, agent query engine, decision ledger and retention.
//!
//! Agents never see a [`MemoryEntry`]; they receive [`AgentMemorySummary`]
//! values from [`query_for_agent`], which filters the index through the
//! guard before any content is resolved.

pub mod decision;
pub mod entry;
pub mod error;
pub mod guard;
pub mod index;
pub mod query;
pub mod redaction;
pub mod retention;
pub mod store;

pub use decision::{narrative_entry, DecisionLedger, DecisionTrace, ImpactLevel, DECISION_TAG};
pub use entry::{ContentType, EntryPatch, MemoryContent, MemoryEntry, MemoryLayer, NewEntry};
pub use error::{MemoryError, MemoryResult};
pub use guard::{
    can_access_memory, evaluate_access, is_purpose_allowed, AccessContext, AccessPurpose,
    AccessVerdict, DenialReason,
};
pub use index::{sphere_principal, IndexQuery, MemoryIndex, MemoryIndexPointer, PUBLIC_PRINCIPAL};
pub use query::{query_for_agent, AgentQuery, AgentQueryResult};
pub use redaction::{create_redacted_summary, AgentMemorySummary, SummaryDetail};
pub use retention::{default_rules, RetentionEngine, RetentionReport, RetentionRule};
pub use store::{LinkOptions, MemoryStore};
