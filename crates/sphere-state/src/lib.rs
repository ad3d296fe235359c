//! Sphere-State: isolated per-sphere storage for the Sphere Backbone
//!
//! ## Layer 0 - Tenant Storage
//!
//! Focus: strict isolation. A record belongs to exactly one sphere and is
//! never copied into another one implicitly; there is no cross-sphere scan.
//!
//! ## Key Components
//!
//! - `SphereStore`: per-sphere record CRUD, tag/date filters, expiry cleanup
//! - `SphereSnapshot` / `SnapshotStore`: backup boundary to an external store
//! - `ChangeFeed`: payload-free change notifications
//! - `ActorKind` / `Sensitivity`: vocabulary shared with the memory layer

mod error;
pub mod fakes;
pub mod feed;
pub mod model;
pub mod snapshot;
mod store;

pub use error::{SphereError, SphereResult};
pub use feed::{ChangeEvent, ChangeFeed, ChangeSource, DeferredPublish, HeldEvents};
pub use model::{
    ActorKind, EncryptionLevel, RecordOptions, RecordPatch, RetentionPolicy, Sensitivity,
    SphereMeta, SphereOptions, SpherePatch, SphereRecord, Visibility,
};
pub use snapshot::{load_sphere, save_sphere, sphere_key, ContentDigest, SnapshotStore, SphereSnapshot};
pub use store::SphereStore;
