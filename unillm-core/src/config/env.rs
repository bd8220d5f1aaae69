//! Credential environment handed to providers
//!
//! The environment is a flat key -> value mapping. Values are either plain
//! secrets (bearer tokens, endpoint overrides) or bound callables such as an
//! edge-runtime AI binding.

use super::secrets::SecretString;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a bound AI callable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BindingError {
    pub message: String,
}

impl BindingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A bound callable that runs a model in-process
///
/// Receives the model identifier and the request payload and returns the
/// backend's native response: a bare string or a JSON object.
#[async_trait]
pub trait AiBinding: Send + Sync {
    async fn run(&self, model: &str, payload: Value) -> Result<Value, BindingError>;
}

/// A single environment entry
#[derive(Clone)]
pub enum EnvValue {
    Secret(SecretString),
    Binding(Arc<dyn AiBinding>),
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Secret(secret) => write!(f, "Secret({:?})", secret),
            EnvValue::Binding(_) => write!(f, "Binding(..)"),
        }
    }
}

/// Flat credential mapping consulted by validation and providers
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: HashMap<String, EnvValue>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the listed keys from the process environment, skipping absent ones
    pub fn from_process_env(keys: &[&str]) -> Self {
        let mut env = Self::new();
        for key in keys {
            if let Ok(value) = std::env::var(key) {
                env.insert(*key, EnvValue::Secret(SecretString::new(value)));
            }
        }
        env
    }

    /// Add a secret entry
    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<SecretString>) -> Self {
        self.insert(key, EnvValue::Secret(value.into()));
        self
    }

    /// Add a bound callable entry
    pub fn with_binding(mut self, key: impl Into<String>, binding: Arc<dyn AiBinding>) -> Self {
        self.insert(key, EnvValue::Binding(binding));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: EnvValue) {
        self.values.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.values.get(key)
    }

    /// Secret stored under `key`, if that entry is a secret
    pub fn secret(&self, key: &str) -> Option<&SecretString> {
        match self.values.get(key) {
            Some(EnvValue::Secret(secret)) => Some(secret),
            _ => None,
        }
    }

    /// Binding stored under `key`, if that entry is a binding
    pub fn binding(&self, key: &str) -> Option<Arc<dyn AiBinding>> {
        match self.values.get(key) {
            Some(EnvValue::Binding(binding)) => Some(Arc::clone(binding)),
            _ => None,
        }
    }

    /// Keys from `required` absent from this environment, in declared order
    ///
    /// An empty secret counts as absent.
    pub fn missing_keys<'a, S: AsRef<str>>(&self, required: &'a [S]) -> Vec<&'a str> {
        required
            .iter()
            .map(|key| key.as_ref())
            .filter(|key| match self.get(key) {
                Some(EnvValue::Secret(secret)) => secret.is_empty(),
                Some(EnvValue::Binding(_)) => false,
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl AiBinding for Echo {
        async fn run(&self, _model: &str, payload: Value) -> Result<Value, BindingError> {
            Ok(payload)
        }
    }

    #[test]
    fn test_missing_keys_in_declared_order() {
        let env = Environment::new().with_secret("B", "value");
        let missing = env.missing_keys(&["C", "B", "A"]);
        assert_eq!(missing, vec!["C", "A"]);
    }

    #[test]
    fn test_empty_secret_counts_as_missing() {
        let env = Environment::new()
            .with_secret("TOKEN", "")
            .with_binding("AI", Arc::new(Echo));
        assert_eq!(env.missing_keys(&["TOKEN", "AI"]), vec!["TOKEN"]);
    }

    #[test]
    fn test_typed_accessors() {
        let env = Environment::new()
            .with_secret("TOKEN", "abc")
            .with_binding("AI", Arc::new(Echo));

        assert_eq!(env.secret("TOKEN").map(|s| s.expose_secret()), Some("abc"));
        assert!(env.secret("AI").is_none());
        assert!(env.binding("AI").is_some());
        assert!(env.binding("TOKEN").is_none());
        assert_eq!(format!("{:?}", env.get("AI").unwrap()), "Binding(..)");
    }

    #[test]
    fn test_from_process_env_skips_absent_keys() {
        std::env::set_var("UNILLM_ENV_TEST_PRESENT", "yes");

        let env = Environment::from_process_env(&[
            "UNILLM_ENV_TEST_PRESENT",
            "UNILLM_ENV_TEST_ABSENT",
        ]);

        assert!(env.contains("UNILLM_ENV_TEST_PRESENT"));
        assert!(!env.contains("UNILLM_ENV_TEST_ABSENT"));

        std::env::remove_var("UNILLM_ENV_TEST_PRESENT");
    }
}
