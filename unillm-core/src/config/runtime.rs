//! Process-wide runtime tuning
//!
//! [`RuntimeConfig`] holds the knobs read at call time (timeout, retry policy,
//! cache and logging toggles). It lives behind a [`RuntimeConfigManager`] that
//! only exposes a defensive-copy read and a recursive merge. Nothing resets it
//! implicitly.

use super::error::{ConfigError, ConfigResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Retry tuning used for the policy-driven executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the initial attempt
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(rename = "baseDelay")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(rename = "maxDelay")]
    pub max_delay_ms: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            extra: Map::new(),
        }
    }
}

/// Response cache toggle; declared for collaborators, not enforced here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Entry lifetime in seconds
    #[serde(rename = "ttl")]
    pub ttl_secs: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 300,
            extra: Map::new(),
        }
    }
}

/// Logging toggle and level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub enabled: bool,
    pub level: String,

    /// Keys this crate does not read, kept for collaborators
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            extra: Map::new(),
        }
    }
}

/// Runtime configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Transport timeout in milliseconds
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,

    pub retries: RetrySettings,

    pub cache: CacheSettings,

    pub logging: LoggingSettings,

    /// Collaborator-defined settings, merged like everything else
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retries: RetrySettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingSettings::default(),
            extensions: Map::new(),
        }
    }
}

/// Recursively merge `patch` into `target`
///
/// Two objects merge key by key at any depth; any other pairing (arrays
/// included) replaces the target value outright.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let both_objects =
                    value.is_object() && target.get(key).is_some_and(Value::is_object);

                match target.get_mut(key) {
                    Some(existing) if both_objects => deep_merge(existing, value),
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

static GLOBAL: Lazy<Arc<RuntimeConfigManager>> =
    Lazy::new(|| Arc::new(RuntimeConfigManager::new()));

/// Owner of the mutable runtime configuration
#[derive(Debug, Default)]
pub struct RuntimeConfigManager {
    current: RwLock<RuntimeConfig>,
}

impl RuntimeConfigManager {
    /// Create a manager initialized to defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    /// The process-wide manager
    pub fn global() -> Arc<RuntimeConfigManager> {
        Arc::clone(&GLOBAL)
    }

    /// Copy of the current settings
    pub fn get_config(&self) -> RuntimeConfig {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Deep-merge a partial update into the current settings
    ///
    /// The merged result must still describe a valid [`RuntimeConfig`];
    /// otherwise the update is rejected and the current settings stay as
    /// they were.
    pub fn update_config(&self, partial: &Value) -> ConfigResult<()> {
        if !partial.is_object() {
            return Err(ConfigError::invalid("runtime config update must be an object"));
        }

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut merged = serde_json::to_value(&*current)
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        deep_merge(&mut merged, partial);

        let updated: RuntimeConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::invalid(e.to_string()))?;
        *current = updated;
        Ok(())
    }

    /// Restore the defaults
    pub fn reset(&self) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = RuntimeConfig::default();
    }

    /// Merge overrides read from a YAML file
    pub fn load_overrides_from_yaml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = read_file(path)?;

        let partial: Value =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_string_lossy().to_string(),
                line: e.location().map(|l| l.line()),
                column: e.location().map(|l| l.column()),
                message: e.to_string(),
            })?;

        self.update_config(&partial)
    }

    /// Merge overrides read from a JSON file
    pub fn load_overrides_from_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = read_file(path)?;

        let partial: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_string_lossy().to_string(),
                line: Some(e.line()),
                column: Some(e.column()),
                message: e.to_string(),
            })?;

        self.update_config(&partial)
    }
}

fn read_file(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfigManager::new().get_config();
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.retries, RetrySettings::default());
        assert!(!config.cache.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_disjoint_updates_accumulate() {
        let manager = RuntimeConfigManager::new();

        manager.update_config(&json!({"retries": {"maxAttempts": 5}})).unwrap();
        manager.update_config(&json!({"logging": {"level": "debug"}})).unwrap();

        let config = manager.get_config();
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.base_delay_ms, 1000);
        assert_eq!(config.retries.max_delay_ms, 10_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.enabled);
    }

    #[test]
    fn test_update_does_not_mutate_input() {
        let manager = RuntimeConfigManager::new();
        let partial = json!({"cache": {"enabled": true}});
        let before = partial.clone();

        manager.update_config(&partial).unwrap();

        assert_eq!(partial, before);
        assert!(manager.get_config().cache.enabled);
    }

    #[test]
    fn test_get_config_is_a_copy() {
        let manager = RuntimeConfigManager::new();
        let mut copy = manager.get_config();
        copy.timeout_ms = 1;
        assert_eq!(manager.get_config().timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_update_leaves_config_untouched() {
        let manager = RuntimeConfigManager::new();

        let err = manager
            .update_config(&json!({"retries": {"maxAttempts": "lots"}}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(manager.update_config(&json!([1, 2])).is_err());

        assert_eq!(manager.get_config(), RuntimeConfig::default());
    }

    #[test]
    fn test_extension_settings_merge_at_depth_and_arrays_replace() {
        let manager = RuntimeConfigManager::new();

        manager
            .update_config(&json!({"gateway": {"a": {"b": {"c": 1, "tags": ["x", "y"]}}}}))
            .unwrap();
        manager
            .update_config(&json!({"gateway": {"a": {"b": {"d": 2, "tags": ["z"]}}}}))
            .unwrap();

        let config = manager.get_config();
        assert_eq!(
            config.extensions["gateway"],
            json!({"a": {"b": {"c": 1, "d": 2, "tags": ["z"]}}})
        );
    }

    #[test]
    fn test_unknown_section_keys_merge_alongside_known_ones() {
        let manager = RuntimeConfigManager::new();

        manager
            .update_config(&json!({"cache": {"enabled": true, "backend": "redis"}}))
            .unwrap();
        manager
            .update_config(&json!({"cache": {"backend": {"url": "redis://local"}}, "retries": {"strategy": "linear"}}))
            .unwrap();

        let config = manager.get_config();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.extra["backend"], json!({"url": "redis://local"}));
        assert_eq!(config.retries.extra["strategy"], "linear");
        assert_eq!(config.retries.max_attempts, 3);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let manager = RuntimeConfigManager::new();
        manager.update_config(&json!({"timeout": 5})).unwrap();
        manager.reset();
        assert_eq!(manager.get_config(), RuntimeConfig::default());
    }

    #[test]
    fn test_load_overrides_from_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runtime.yaml");
        fs::write(&path, "retries:\n  maxDelay: 2500\nlogging:\n  enabled: false\n").unwrap();

        let manager = RuntimeConfigManager::new();
        manager.load_overrides_from_yaml(&path).unwrap();

        let config = manager.get_config();
        assert_eq!(config.retries.max_delay_ms, 2500);
        assert_eq!(config.retries.max_attempts, 3);
        assert!(!config.logging.enabled);
    }

    #[test]
    fn test_load_overrides_reports_parse_location() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runtime.json");
        fs::write(&path, "{\n  \"timeout\": ,\n}").unwrap();

        let manager = RuntimeConfigManager::new();
        match manager.load_overrides_from_json(&path) {
            Err(ConfigError::ParseError { line, .. }) => assert_eq!(line, Some(2)),
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_load_overrides_missing_file() {
        let manager = RuntimeConfigManager::new();
        let result = manager.load_overrides_from_yaml("/definitely/not/here.yaml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }

    proptest! {
        #[test]
        fn prop_disjoint_merges_are_a_union(
            left in proptest::collection::btree_map("[a-m]{1,6}", any::<i64>(), 0..8),
            right in proptest::collection::btree_map("[n-z]{1,6}", any::<i64>(), 0..8),
        ) {
            let mut target = json!({"nested": {}});
            deep_merge(&mut target, &json!({"nested": left.clone()}));
            deep_merge(&mut target, &json!({"nested": right.clone()}));

            let nested = target["nested"].as_object().unwrap();
            prop_assert_eq!(nested.len(), left.len() + right.len());
            for (key, value) in left.iter().chain(right.iter()) {
                prop_assert_eq!(&nested[key], &json!(value));
            }
        }
    }
}
