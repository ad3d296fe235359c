//! Loading `BackboneConfig` from disk.

use std::io::Write;

use backbone_core::{BackboneConfig, BackboneError, MemoryLayer, MemoryManager};

#[test]
fn test_from_file_applies_settings() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
lock_timeout_ms = 250

[query]
default_max_results = 5

[notifications]
channel_capacity = 8

[logging]
json = true
level = "debug"

[[retention]]
layer = "narrative"
max_age_days = 30
exempt_tags = ["milestone"]
priority = 2

[[retention]]
layer = "sphere_local"
max_age_days = 7
priority = 1
"#
    )
    .unwrap();

    let config = BackboneConfig::from_file(file.path()).unwrap();
    assert_eq!(config.lock_timeout_ms, 250);
    assert_eq!(config.query.default_max_results, 5);
    assert_eq!(config.notifications.channel_capacity, 8);
    assert!(config.logging.json);

    let mgr = MemoryManager::from_config(&config).unwrap();
    let layers: Vec<MemoryLayer> = mgr.retention().rules().iter().map(|r| r.layer).collect();
    assert_eq!(layers, vec![MemoryLayer::SphereLocal, MemoryLayer::Narrative]);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BackboneConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, BackboneError::Io(_)));
}
