//! Purpose-indexed redaction. Agents receive summaries, never entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphere_state::ActorKind;

use super::entry::{ContentType, MemoryEntry, MemoryLayer};
use super::guard::AccessPurpose;

/// Purpose-dependent part of a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detail", rename_all = "snake_case")]
pub enum SummaryDetail {
    /// `learning` and `export`: nothing beyond type and time, not even the id.
    Minimal,
    /// `analysis` and `decision`: where the entry lives.
    Scoped {
        entry_id: String,
        layer: MemoryLayer,
        sphere_id: Option<String>,
    },
    /// `display`: a sensitivity-qualified availability notice.
    Notice { entry_id: String, notice: String },
    /// `audit`: provenance without content.
    Audit {
        entry_id: String,
        layer: MemoryLayer,
        sphere_id: Option<String>,
        author_kind: ActorKind,
        version: u64,
    },
}

/// What an agent gets back for one permitted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMemorySummary {
    pub content_type: ContentType,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: SummaryDetail,
}

impl AgentMemorySummary {
    /// Entry id, for purposes that disclose it.
    pub fn entry_id(&self) -> Option<&str> {
        match &self.detail {
            SummaryDetail::Minimal => None,
            SummaryDetail::Scoped { entry_id, .. }
            | SummaryDetail::Notice { entry_id, .. }
            | SummaryDetail::Audit { entry_id, .. } => Some(entry_id),
        }
    }
}

/// One-way summary of `entry` for `purpose`.
pub fn create_redacted_summary(entry: &MemoryEntry, purpose: AccessPurpose) -> AgentMemorySummary {
    let detail = match purpose {
        AccessPurpose::Learning | AccessPurpose::Export => SummaryDetail::Minimal,
        AccessPurpose::Analysis | AccessPurpose::Decision => SummaryDetail::Scoped {
            entry_id: entry.id.clone(),
            layer: entry.layer,
            sphere_id: entry.sphere_id.clone(),
        },
        AccessPurpose::Display => SummaryDetail::Notice {
            entry_id: entry.id.clone(),
            notice: format!(
                "{} {} memory available",
                entry.sensitivity,
                entry.content_type()
            ),
        },
        AccessPurpose::Audit => SummaryDetail::Audit {
            entry_id: entry.id.clone(),
            layer: entry.layer,
            sphere_id: entry.sphere_id.clone(),
            author_kind: entry.author_kind,
            version: entry.version,
        },
    };
    AgentMemorySummary {
        content_type: entry.content_type(),
        timestamp: entry.timestamp,
        detail,
    }
}
