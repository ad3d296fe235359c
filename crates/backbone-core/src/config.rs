//! Backbone configuration, loadable from TOML.
//!
//! Every section is optional; omitted keys fall back to the defaults below.
//!
//! ```toml
//! lock_timeout_ms = 500
//!
//! [query]
//! default_max_results = 50
//!
//! [notifications]
//! channel_capacity = 64
//!
//! [logging]
//! json = false
//! level = "info"
//!
//! [[retention]]
//! layer = "sphere_local"
//! max_age_days = 90
//! priority = 1
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BackboneError, BackboneResult};
use crate::memory::{default_rules, RetentionRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Cap applied when an agent query sets none.
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
}

fn default_max_results() -> usize {
    50
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    /// Used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: default_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> BackboneResult<tracing::Level> {
        tracing::Level::from_str(&self.level)
            .map_err(|_| BackboneError::Config(format!("unknown log level: {}", self.level)))
    }
}

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_retention() -> Vec<RetentionRule> {
    default_rules()
}

/// Complete backbone configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackboneConfig {
    #[serde(default = "default_retention")]
    pub retention: Vec<RetentionRule>,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            query: QueryConfig::default(),
            notifications: NotificationConfig::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BackboneConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> BackboneResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| BackboneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BackboneResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns `BackboneError::Config` for zero-valued limits or an unknown
    /// log level.
    pub fn validate(&self) -> BackboneResult<()> {
        if self.query.default_max_results == 0 {
            return Err(BackboneError::Config(
                "query.default_max_results must be positive".into(),
            ));
        }
        if self.notifications.channel_capacity == 0 {
            return Err(BackboneError::Config(
                "notifications.channel_capacity must be positive".into(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(BackboneError::Config("lock_timeout_ms must be positive".into()));
        }
        self.logging.level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLayer;

    #[test]
    fn test_empty_document_is_default() {
        let config = BackboneConfig::from_toml_str("").unwrap();
        assert_eq!(config, BackboneConfig::default());
        assert_eq!(config.query.default_max_results, 50);
        assert_eq!(config.notifications.channel_capacity, 64);
        assert_eq!(config.lock_timeout(), Duration::from_millis(500));
        assert_eq!(config.retention.len(), 4);
    }

    #[test]
    fn test_retention_override_replaces_defaults() {
        let raw = r#"
            [[retention]]
            layer = "collective"
            max_entries = 10
            exempt_tags = ["pinned"]
            priority = 1
        "#;
        let config = BackboneConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.retention.len(), 1);
        let rule = &config.retention[0];
        assert_eq!(rule.layer, MemoryLayer::Collective);
        assert_eq!(rule.max_entries, Some(10));
        assert!(rule.max_age_days.is_none());
        assert!(rule.exempt_tags.contains("pinned"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BackboneConfig::from_toml_str("lock_timeout_ms = 0"),
            Err(BackboneError::Config(_))
        ));
        assert!(matches!(
            BackboneConfig::from_toml_str("[logging]\nlevel = \"loud\""),
            Err(BackboneError::Config(_))
        ));
        assert!(matches!(
            BackboneConfig::from_toml_str("lock_timeout_ms = \"soon\""),
            Err(BackboneError::Config(_))
        ));
    }
}
