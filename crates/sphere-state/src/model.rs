//! Sphere and record model shared by every layer of the backbone.
//!
//! `ActorKind` and `Sensitivity` are the common vocabulary: the memory layer
//! in `backbone-core` reuses them for entries, pointers and access contexts.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who performed a write (or who is asking for a read).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    #[default]
    User,
    Agent,
    System,
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Sensitivity label attached to records and memory entries.
///
/// Labels that are not recognised on import deserialize to `Unclassified`,
/// which every guard treats as denied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Public,
    #[default]
    Private,
    Restricted,
    #[serde(other)]
    Unclassified,
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
            Self::Restricted => write!(f, "restricted"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Who may discover a sphere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
    Public,
}

/// At-rest encryption requested for a sphere. Enforcement belongs to the
/// external store that persists snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionLevel {
    None,
    #[default]
    Standard,
    EndToEnd,
}

/// Coarse retention class for a whole sphere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    Session,
    ShortTerm,
    #[default]
    LongTerm,
    Permanent,
}

/// Metadata of one isolated sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereMeta {
    pub id: String,
    pub owner_id: String,
    pub display_name: String,
    pub visibility: Visibility,
    pub encryption_level: EncryptionLevel,
    pub retention_policy: RetentionPolicy,
    /// Incremented on every committed mutation inside the sphere.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SphereMeta {
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// Caller overrides applied on top of the sphere defaults.
#[derive(Debug, Clone, Default)]
pub struct SphereOptions {
    pub display_name: Option<String>,
    pub visibility: Option<Visibility>,
    pub encryption_level: Option<EncryptionLevel>,
    pub retention_policy: Option<RetentionPolicy>,
}

impl SphereOptions {
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_encryption(mut self, level: EncryptionLevel) -> Self {
        self.encryption_level = Some(level);
        self
    }

    pub fn with_retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention_policy = Some(policy);
        self
    }
}

/// Mutable sphere settings. The owner and id never change.
pub type SpherePatch = SphereOptions;

/// A single record owned by exactly one sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereRecord<T> {
    pub id: String,
    pub sphere_id: String,
    pub author_id: String,
    pub author_kind: ActorKind,
    pub data: T,
    pub tags: BTreeSet<String>,
    pub sensitivity: Sensitivity,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T> SphereRecord<T> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|t| self.tags.contains(*t))
    }

    /// Whether `requester_id` may read this record inside a sphere owned by
    /// `owner_id`.
    ///
    /// Public records are readable by anyone, private ones by the author and
    /// the sphere owner, everything else by the author alone.
    pub fn is_visible_to(&self, requester_id: &str, owner_id: &str) -> bool {
        match self.sensitivity {
            Sensitivity::Public => true,
            Sensitivity::Private => requester_id == self.author_id || requester_id == owner_id,
            Sensitivity::Restricted | Sensitivity::Unclassified => requester_id == self.author_id,
        }
    }
}

/// Options for a new record.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub author_kind: ActorKind,
    pub tags: BTreeSet<String>,
    pub sensitivity: Sensitivity,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RecordOptions {
    pub fn authored_by(mut self, kind: ActorKind) -> Self {
        self.author_kind = kind;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// Partial update of a record. `None` leaves a field untouched; the outer
/// `Option` of `expires_at` distinguishes "keep" from "clear".
#[derive(Debug, Clone)]
pub struct RecordPatch<T> {
    pub data: Option<T>,
    pub tags: Option<BTreeSet<String>>,
    pub sensitivity: Option<Sensitivity>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl<T> Default for RecordPatch<T> {
    fn default() -> Self {
        Self {
            data: None,
            tags: None,
            sensitivity: None,
            expires_at: None,
        }
    }
}

impl<T> RecordPatch<T> {
    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}
