//! End-to-end tests for sphere isolation, requester-scoped reads and the
//! export/import round trip.

use chrono::{Duration, Utc};
use serde_json::json;

use sphere_state::{
    ActorKind, EncryptionLevel, RecordOptions, Sensitivity, SphereError, SphereOptions,
    SphereStore, Visibility,
};

#[test]
fn test_private_record_visible_to_author_only() {
    let mut store: SphereStore<serde_json::Value> = SphereStore::new();
    store
        .create_sphere("biz-1", "owner-1", SphereOptions::default())
        .unwrap();
    let record = store
        .create_record(
            "biz-1",
            "u1",
            json!({"invoice": 42}),
            RecordOptions::default().with_sensitivity(Sensitivity::Private),
        )
        .unwrap();

    let seen = store.get_record_for("biz-1", &record.id, "u1").unwrap();
    assert_eq!(seen.data, json!({"invoice": 42}));

    let err = store.get_record_for("biz-1", &record.id, "u2").unwrap_err();
    assert!(err.is_not_found());
    assert!(store.records_for("biz-1", "u2").unwrap().is_empty());
    assert_eq!(store.records_for("biz-1", "u1").unwrap().len(), 1);
}

#[test]
fn test_public_record_visible_to_everyone() {
    let mut store: SphereStore<serde_json::Value> = SphereStore::new();
    store
        .create_sphere("biz-1", "owner-1", SphereOptions::default())
        .unwrap();
    let record = store
        .create_record(
            "biz-1",
            "u1",
            json!("notice"),
            RecordOptions::default().with_sensitivity(Sensitivity::Public),
        )
        .unwrap();
    assert!(store.get_record_for("biz-1", &record.id, "anyone").is_ok());
}

#[test]
fn test_spheres_do_not_share_records() {
    let mut store: SphereStore<serde_json::Value> = SphereStore::new();
    store
        .create_sphere("home", "u1", SphereOptions::default())
        .unwrap();
    store
        .create_sphere("work", "u1", SphereOptions::default())
        .unwrap();
    store
        .create_record("home", "u1", json!(1), RecordOptions::default().with_tag("shared"))
        .unwrap();
    store
        .create_record("work", "u1", json!(2), RecordOptions::default().with_tag("shared"))
        .unwrap();

    let home = store.query_by_tags("home", &["shared"]).unwrap();
    assert_eq!(home.len(), 1);
    assert_eq!(home[0].data, json!(1));
    assert!(home.iter().all(|r| r.sphere_id == "home"));
}

#[test]
fn test_export_import_round_trip() {
    let mut source: SphereStore<serde_json::Value> = SphereStore::new();
    source
        .create_sphere(
            "biz-1",
            "owner-1",
            SphereOptions::default()
                .with_display_name("Business")
                .with_visibility(Visibility::Shared)
                .with_encryption(EncryptionLevel::EndToEnd),
        )
        .unwrap();
    for i in 0..3 {
        source
            .create_record(
                "biz-1",
                "u1",
                json!({ "n": i }),
                RecordOptions::default()
                    .authored_by(ActorKind::System)
                    .with_tag("ledger")
                    .expires_at(Utc::now() + Duration::days(30)),
            )
            .unwrap();
    }

    let snapshot = source.export_sphere("biz-1").unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();

    let mut target: SphereStore<serde_json::Value> = SphereStore::new();
    target
        .import_sphere(serde_json::from_str(&json).unwrap())
        .unwrap();

    let exported_again = target.export_sphere("biz-1").unwrap();
    assert_eq!(exported_again.records, snapshot.records);

    let mut meta_a = snapshot.meta.clone();
    let mut meta_b = exported_again.meta.clone();
    meta_a.updated_at = meta_b.updated_at;
    meta_b.updated_at = meta_a.updated_at;
    assert_eq!(meta_a, meta_b);
}

#[test]
fn test_import_never_overwrites() {
    let mut store: SphereStore<serde_json::Value> = SphereStore::new();
    store
        .create_sphere("biz-1", "owner-1", SphereOptions::default())
        .unwrap();
    store
        .create_record("biz-1", "u1", json!("keep me"), RecordOptions::default())
        .unwrap();

    let mut other: SphereStore<serde_json::Value> = SphereStore::new();
    other
        .create_sphere("biz-1", "intruder", SphereOptions::default())
        .unwrap();
    let snapshot = other.export_sphere("biz-1").unwrap();

    let err = store.import_sphere(snapshot).unwrap_err();
    assert!(matches!(err, SphereError::AlreadyExists(_)));
    assert_eq!(store.get_sphere("biz-1").unwrap().owner_id, "owner-1");
    assert_eq!(store.records("biz-1").unwrap().len(), 1);
}
