//! Memory entries: layered, typed content with sensitivity and lifetime.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sphere_state::{ActorKind, Sensitivity};

use super::decision::DecisionTrace;

/// The namespace an entry lives in. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    SphereLocal,
    CrossSphere,
    Collective,
    Narrative,
    Archive,
}

impl MemoryLayer {
    pub const ALL: [MemoryLayer; 5] = [
        MemoryLayer::SphereLocal,
        MemoryLayer::CrossSphere,
        MemoryLayer::Collective,
        MemoryLayer::Narrative,
        MemoryLayer::Archive,
    ];
}

impl std::fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SphereLocal => write!(f, "sphere_local"),
            Self::CrossSphere => write!(f, "cross_sphere"),
            Self::Collective => write!(f, "collective"),
            Self::Narrative => write!(f, "narrative"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

/// Discriminant of [`MemoryContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Structured,
    Reference,
    Decision,
    Event,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Structured => write!(f, "structured"),
            Self::Reference => write!(f, "reference"),
            Self::Decision => write!(f, "decision"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Entry payload, keyed by content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryContent {
    Text {
        text: String,
    },
    Structured {
        value: serde_json::Value,
    },
    /// Points at other entries; cross-sphere links use this shape.
    Reference {
        linked_entry_ids: Vec<String>,
        reason: String,
    },
    Decision {
        trace: DecisionTrace,
    },
    Event {
        name: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl MemoryContent {
    pub fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self::Structured { value }
    }

    pub fn event(name: &str, payload: serde_json::Value) -> Self {
        Self::Event {
            name: name.to_string(),
            payload,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text { .. } => ContentType::Text,
            Self::Structured { .. } => ContentType::Structured,
            Self::Reference { .. } => ContentType::Reference,
            Self::Decision { .. } => ContentType::Decision,
            Self::Event { .. } => ContentType::Event,
        }
    }

    /// SHA-256 hex digest of the serialized content.
    pub fn digest(&self) -> Option<String> {
        let bytes = serde_json::to_vec(self).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some(hex::encode(hasher.finalize()))
    }
}

/// A stored memory entry. Only the memory store and the redaction layer ever
/// see `content`; everything else works on index pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub layer: MemoryLayer,
    pub sphere_id: Option<String>,
    #[serde(default)]
    pub related_sphere_ids: Vec<String>,
    #[serde(default)]
    pub related_entity_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub author_kind: ActorKind,
    pub author_id: String,
    pub content: MemoryContent,
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Principals granted access beyond the author (user ids or roles).
    #[serde(default)]
    pub shared_with: BTreeSet<String>,
    pub ttl_ms: Option<u64>,
    pub version: u64,
}

impl MemoryEntry {
    pub fn content_type(&self) -> ContentType {
        self.content.content_type()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms
            .map(|ms| Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX)))
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// True once the entry has outlived its own TTL.
    pub fn is_ttl_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.ttl().is_some_and(|ttl| self.age_at(now) > ttl)
    }

    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }
}

/// Parameters of a new entry. Id and version are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub layer: MemoryLayer,
    pub sphere_id: Option<String>,
    pub related_sphere_ids: Vec<String>,
    pub related_entity_ids: Vec<String>,
    pub author_kind: ActorKind,
    pub author_id: String,
    pub content: MemoryContent,
    pub sensitivity: Sensitivity,
    pub tags: BTreeSet<String>,
    pub ttl_ms: Option<u64>,
    /// Defaults to the time of insertion.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEntry {
    pub fn new(
        layer: MemoryLayer,
        author_kind: ActorKind,
        author_id: &str,
        content: MemoryContent,
    ) -> Self {
        Self {
            layer,
            sphere_id: None,
            related_sphere_ids: Vec::new(),
            related_entity_ids: Vec::new(),
            author_kind,
            author_id: author_id.to_string(),
            content,
            sensitivity: Sensitivity::Private,
            tags: BTreeSet::new(),
            ttl_ms: None,
            timestamp: None,
        }
    }

    pub fn in_sphere(mut self, sphere_id: &str) -> Self {
        self.sphere_id = Some(sphere_id.to_string());
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn related_to_spheres(mut self, sphere_ids: &[&str]) -> Self {
        self.related_sphere_ids = sphere_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn related_to_entities(mut self, entity_ids: &[&str]) -> Self {
        self.related_entity_ids = entity_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// In-place update. Layer, author and id are immutable; an entry that must
/// change layer is re-created and linked instead.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub content: Option<MemoryContent>,
    pub related_sphere_ids: Option<Vec<String>>,
    pub related_entity_ids: Option<Vec<String>>,
    pub sensitivity: Option<Sensitivity>,
    pub tags: Option<BTreeSet<String>>,
    pub ttl_ms: Option<Option<u64>>,
}

impl EntryPatch {
    pub fn with_content(mut self, content: MemoryContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: Option<u64>) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn related_to_spheres(mut self, sphere_ids: &[&str]) -> Self {
        self.related_sphere_ids = Some(sphere_ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn related_to_entities(mut self, entity_ids: &[&str]) -> Self {
        self.related_entity_ids = Some(entity_ids.iter().map(|s| s.to_string()).collect());
        self
    }
}
