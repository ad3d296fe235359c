//! Backbone Core: layered, permission-guarded memory for agents
//!
//! ## Memory Unification
//!
//! Focus: agents never read raw memory. Every agent read goes through
//! [`query_for_agent`], which filters the content-free index through the
//! access guard and returns purpose-redacted summaries.
//!
//! ## Key Components
//!
//! - `MemoryStore` / `MemoryIndex`: layered entries with pointers kept in lockstep
//! - `AccessGuard` functions: visibility and purpose predicates, fail-closed
//! - `DecisionLedger`: append-only traces mirrored into the narrative layer
//! - `RetentionEngine`: per-layer forgetting rules with tag exemptions
//! - `MemoryManager`: facade with change feed and export/import
//! - `SharedBackbone`: lock-per-store concurrent handle with timeouts

pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod shared;
pub mod telemetry;

pub use config::{BackboneConfig, LoggingConfig, NotificationConfig, QueryConfig};
pub use error::{BackboneError, BackboneResult};
pub use manager::{MemoryManager, MemorySnapshot};
pub use memory::{
    can_access_memory, create_redacted_summary, evaluate_access, is_purpose_allowed,
    query_for_agent, AccessContext, AccessPurpose, AgentMemorySummary, AgentQuery,
    AgentQueryResult, ContentType, DecisionLedger, DecisionTrace, EntryPatch, ImpactLevel,
    IndexQuery, LinkOptions, MemoryContent, MemoryEntry, MemoryError, MemoryIndex,
    MemoryIndexPointer, MemoryLayer, MemoryResult, MemoryStore, NewEntry, RetentionEngine,
    RetentionReport, RetentionRule, SummaryDetail,
};
pub use shared::{SharedBackbone, StoreWriteGuard, MEMORY_SNAPSHOT_KEY};
pub use telemetry::init_tracing;

pub use sphere_state::{
    ActorKind, ChangeEvent, ChangeFeed, ChangeSource, Sensitivity, SphereError, SphereStore,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
