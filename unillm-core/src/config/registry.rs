//! Provider-keyed static configuration and request validation
//!
//! Each registered provider owns exactly one [`ProviderConfigSchema`]: the
//! credential keys it needs, default option values, declared features and an
//! optional model-name rule. The registry validates a call against it before
//! any provider is constructed.

use crate::config::env::Environment;
use crate::error::ConfigurationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Feature flags a provider declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFeatures {
    /// Structured JSON output can be forced
    pub json_mode: bool,

    /// Tool/function declarations are accepted
    pub tools: bool,

    /// Incremental delivery is available from the backend
    pub streaming: bool,
}

/// Shape rules for model identifiers, checked in field order
#[derive(Debug, Clone, Default)]
pub struct ModelValidation {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
}

impl ModelValidation {
    /// Check a model name, failing on the first violated rule
    pub fn check(&self, model: &str) -> Result<(), String> {
        let length = model.chars().count();

        if let Some(min) = self.min_length {
            if length < min {
                return Err(format!("Model name must be at least {} characters", min));
            }
        }

        if let Some(max) = self.max_length {
            if length > max {
                return Err(format!("Model name must be at most {} characters", max));
            }
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(model) {
                return Err(format!(
                    "Model name '{}' does not match required pattern {}",
                    model,
                    pattern.as_str()
                ));
            }
        }

        Ok(())
    }
}

/// Static metadata registered per provider
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigSchema {
    /// Credential keys that must be present in the environment
    pub required_env: Vec<String>,

    /// Credential keys consulted when present
    pub optional_env: Vec<String>,

    /// Option values applied when the caller leaves them out
    pub defaults: Map<String, Value>,

    pub features: ProviderFeatures,

    pub model_validation: Option<ModelValidation>,
}

impl ProviderConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_required_env(mut self, keys: &[&str]) -> Self {
        self.required_env = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_optional_env(mut self, keys: &[&str]) -> Self {
        self.optional_env = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    pub fn with_features(mut self, features: ProviderFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_model_validation(mut self, validation: ModelValidation) -> Self {
        self.model_validation = Some(validation);
        self
    }
}

/// Registry of provider schemas
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    schemas: RwLock<BTreeMap<String, ProviderConfigSchema>>,
}

impl ConfigRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in provider schemas
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for builtin in crate::providers::builtins() {
            registry.register_provider_config(builtin.id, builtin.schema);
        }
        registry
    }

    /// Insert or overwrite the schema for a provider
    pub fn register_provider_config(&self, provider: impl Into<String>, schema: ProviderConfigSchema) {
        self.schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(provider.into(), schema);
    }

    /// Look up the schema for a provider
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfigSchema> {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(provider)
            .cloned()
    }

    /// Registered provider identifiers, sorted
    pub fn supported_providers(&self) -> Vec<String> {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Check that the provider exists and its required credentials are present
    pub fn validate_provider(&self, provider: &str, env: &Environment) -> Result<(), ConfigurationError> {
        let schema = self
            .get_provider_config(provider)
            .ok_or_else(|| ConfigurationError::unknown_provider(provider))?;

        let missing = env.missing_keys(schema.required_env.as_slice());
        if !missing.is_empty() {
            return Err(ConfigurationError::missing_credentials(provider, &missing));
        }

        Ok(())
    }

    /// Check a model name against the provider's rule; unknown providers pass
    pub fn validate_model(&self, provider: &str, model: &str) -> Result<(), ConfigurationError> {
        let Some(schema) = self.get_provider_config(provider) else {
            return Ok(());
        };

        match &schema.model_validation {
            Some(rule) => rule
                .check(model)
                .map_err(|message| ConfigurationError::new(provider, message)),
            None => Ok(()),
        }
    }

    /// Sanity-check the well-known numeric options; other keys pass through
    pub fn validate_options(
        &self,
        provider: &str,
        options: &Map<String, Value>,
    ) -> Result<(), ConfigurationError> {
        if self.get_provider_config(provider).is_none() {
            return Ok(());
        }

        if let Some(temperature) = options.get("temperature") {
            match temperature.as_f64() {
                Some(t) if (0.0..=2.0).contains(&t) => {}
                _ => {
                    return Err(ConfigurationError::new(
                        provider,
                        "temperature must be a number between 0 and 2",
                    ))
                }
            }
        }

        if let Some(max_tokens) = options.get("max_tokens") {
            match max_tokens.as_f64() {
                Some(n) if n > 0.0 => {}
                _ => {
                    return Err(ConfigurationError::new(
                        provider,
                        "max_tokens must be a positive number",
                    ))
                }
            }
        }

        Ok(())
    }
}
