//! Access guard: pure decisions over a requester context and a pointer.
//!
//! Two independent predicates, both of which must pass:
//!
//! | Sensitivity  | Who may see it                          | Purposes                         |
//! |--------------|-----------------------------------------|----------------------------------|
//! | public       | everyone                                | all                              |
//! | private      | users listed in the pointer permissions | all but `learning`, `export`     |
//! | restricted   | requesters whose role is listed         | `display`, `analysis`, `audit`   |
//! | unclassified | nobody                                  | none                             |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphere_state::{ActorKind, Sensitivity};

use super::index::MemoryIndexPointer;

/// What the requester intends to do with what it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPurpose {
    Display,
    Analysis,
    Decision,
    Learning,
    Export,
    Audit,
}

impl AccessPurpose {
    pub const ALL: [AccessPurpose; 6] = [
        AccessPurpose::Display,
        AccessPurpose::Analysis,
        AccessPurpose::Decision,
        AccessPurpose::Learning,
        AccessPurpose::Export,
        AccessPurpose::Audit,
    ];
}

impl std::fmt::Display for AccessPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Display => write!(f, "display"),
            Self::Analysis => write!(f, "analysis"),
            Self::Decision => write!(f, "decision"),
            Self::Learning => write!(f, "learning"),
            Self::Export => write!(f, "export"),
            Self::Audit => write!(f, "audit"),
        }
    }
}

/// Already-authenticated requester, supplied by the identity layer and
/// trusted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessContext {
    pub requester_id: String,
    pub requester_kind: ActorKind,
    pub requester_role: Option<String>,
    pub sphere_context: Option<String>,
    pub purpose: AccessPurpose,
    pub timestamp: DateTime<Utc>,
}

impl AccessContext {
    pub fn new(requester_id: &str, requester_kind: ActorKind, purpose: AccessPurpose) -> Self {
        Self {
            requester_id: requester_id.to_string(),
            requester_kind,
            requester_role: None,
            sphere_context: None,
            purpose,
            timestamp: Utc::now(),
        }
    }

    pub fn user(requester_id: &str, purpose: AccessPurpose) -> Self {
        Self::new(requester_id, ActorKind::User, purpose)
    }

    pub fn agent(requester_id: &str, purpose: AccessPurpose) -> Self {
        Self::new(requester_id, ActorKind::Agent, purpose)
    }

    pub fn system(requester_id: &str, purpose: AccessPurpose) -> Self {
        Self::new(requester_id, ActorKind::System, purpose)
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.requester_role = Some(role.to_string());
        self
    }

    pub fn in_sphere(mut self, sphere_id: &str) -> Self {
        self.sphere_context = Some(sphere_id.to_string());
        self
    }

    pub fn for_purpose(mut self, purpose: AccessPurpose) -> Self {
        self.purpose = purpose;
        self
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The requester is not among the principals allowed to see the entry.
    NotPermitted { sensitivity: Sensitivity },
    /// The requester may see the entry but not use it for this purpose.
    PurposeNotAllowed {
        sensitivity: Sensitivity,
        purpose: AccessPurpose,
    },
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPermitted { sensitivity } => {
                write!(f, "requester not permitted on {sensitivity} entry")
            }
            Self::PurposeNotAllowed {
                sensitivity,
                purpose,
            } => write!(f, "purpose {purpose} not allowed on {sensitivity} entry"),
        }
    }
}

/// Outcome of [`evaluate_access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessVerdict {
    Allowed,
    Denied(DenialReason),
}

impl AccessVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// May this requester see the entry behind `pointer` at all?
pub fn can_access_memory(ctx: &AccessContext, pointer: &MemoryIndexPointer) -> bool {
    match pointer.sensitivity {
        Sensitivity::Public => true,
        Sensitivity::Private => {
            ctx.requester_kind == ActorKind::User && pointer.permits(&ctx.requester_id)
        }
        Sensitivity::Restricted => ctx
            .requester_role
            .as_deref()
            .is_some_and(|role| pointer.permits(role)),
        Sensitivity::Unclassified => false,
    }
}

/// May data of this sensitivity be used for `purpose`?
pub fn is_purpose_allowed(sensitivity: Sensitivity, purpose: AccessPurpose) -> bool {
    match sensitivity {
        Sensitivity::Public => true,
        Sensitivity::Private => !matches!(purpose, AccessPurpose::Learning | AccessPurpose::Export),
        Sensitivity::Restricted => matches!(
            purpose,
            AccessPurpose::Display | AccessPurpose::Analysis | AccessPurpose::Audit
        ),
        Sensitivity::Unclassified => false,
    }
}

/// Apply both predicates, visibility first.
pub fn evaluate_access(ctx: &AccessContext, pointer: &MemoryIndexPointer) -> AccessVerdict {
    if !can_access_memory(ctx, pointer) {
        return AccessVerdict::Denied(DenialReason::NotPermitted {
            sensitivity: pointer.sensitivity,
        });
    }
    if !is_purpose_allowed(pointer.sensitivity, ctx.purpose) {
        return AccessVerdict::Denied(DenialReason::PurposeNotAllowed {
            sensitivity: pointer.sensitivity,
            purpose: ctx.purpose,
        });
    }
    AccessVerdict::Allowed
}
