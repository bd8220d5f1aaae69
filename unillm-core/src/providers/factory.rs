//! Provider construction by identifier

use super::Provider;
use crate::config::{Environment, RuntimeConfig, RuntimeConfigManager};
use crate::error::ConfigurationError;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Builds a provider instance from the credential environment and a runtime
/// configuration snapshot
pub type ProviderConstructor = Arc<
    dyn Fn(&Environment, &RuntimeConfig) -> Result<Box<dyn Provider>, ConfigurationError>
        + Send
        + Sync,
>;

/// Wrap a closure as a [`ProviderConstructor`]
pub fn constructor<F>(f: F) -> ProviderConstructor
where
    F: Fn(&Environment, &RuntimeConfig) -> Result<Box<dyn Provider>, ConfigurationError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Registry of provider constructors keyed by provider identifier
#[derive(Default)]
pub struct ProviderFactory {
    constructors: RwLock<BTreeMap<String, ProviderConstructor>>,
}

impl ProviderFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory holding the built-in constructors
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        for builtin in super::builtins() {
            factory.register_provider(builtin.id, builtin.constructor);
        }
        factory
    }

    /// Add or replace the constructor for a provider type
    pub fn register_provider(&self, provider_type: impl Into<String>, constructor: ProviderConstructor) {
        self.constructors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(provider_type.into(), constructor);
    }

    /// Construct a provider using the global runtime configuration
    pub fn create_provider(
        &self,
        provider_type: &str,
        env: &Environment,
    ) -> Result<Box<dyn Provider>, ConfigurationError> {
        let runtime = RuntimeConfigManager::global().get_config();
        self.create_provider_with_config(provider_type, env, &runtime)
    }

    /// Construct a provider against an explicit runtime configuration
    pub fn create_provider_with_config(
        &self,
        provider_type: &str,
        env: &Environment,
        runtime: &RuntimeConfig,
    ) -> Result<Box<dyn Provider>, ConfigurationError> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(provider_type)
            .cloned();

        match constructor {
            Some(constructor) => {
                debug!(provider = provider_type, "Constructing provider");
                constructor(env, runtime)
            }
            None => Err(ConfigurationError::new(
                provider_type,
                format!(
                    "Unknown provider type: {}. Supported providers: {}",
                    provider_type,
                    self.get_supported_providers().join(", ")
                ),
            )),
        }
    }

    /// Registered provider types, sorted
    pub fn get_supported_providers(&self) -> Vec<String> {
        self.constructors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_provider_supported(&self, provider_type: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(provider_type)
    }
}
