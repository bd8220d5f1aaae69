//! Dispatch entry point
//!
//! [`Runner::run`] wires the pipeline for one call: validation against the
//! registry, provider construction, capability checks, policy-driven retried
//! execution and response normalization. Every failure is wrapped exactly
//! once with the provider and the `run` context before it reaches the caller.

use crate::config::{
    ConfigRegistry, ConfigResult, Environment, ProviderConfigSchema, ProviderFeatures,
    RuntimeConfig, RuntimeConfigManager,
};
use crate::error::{ConfigurationError, DispatchError, DispatchResult};
use crate::protocol::{is_truthy, Message, ModelSelector, ProviderRequest};
use crate::providers::{Provider, ProviderConstructor, ProviderFactory};
use crate::response::{DispatchResponse, ResponseBuilder};
use crate::retry::{RetryExecutor, RetryPolicy};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Context label attached to every error leaving [`Runner::run`]
pub const RUN_CONTEXT: &str = "run";

/// Parameters of a single dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub messages: Vec<Message>,
    pub model: ModelSelector,
    pub json_mode: bool,
    pub options: Map<String, Value>,
}

impl RunParams {
    pub fn new(messages: Vec<Message>, model: ModelSelector) -> Self {
        Self {
            messages,
            model,
            json_mode: false,
            options: Map::new(),
        }
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Identifiers registered on only one side of the registry/factory pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryParity {
    /// Schemas without a constructor
    pub registry_only: Vec<String>,

    /// Constructors without a schema
    pub factory_only: Vec<String>,
}

impl RegistryParity {
    pub fn is_consistent(&self) -> bool {
        self.registry_only.is_empty() && self.factory_only.is_empty()
    }
}

/// Built-in registry/factory pair shared by every [`Runner::new`]
static SHARED: Lazy<(Arc<ConfigRegistry>, Arc<ProviderFactory>)> = Lazy::new(|| {
    (
        Arc::new(ConfigRegistry::with_builtins()),
        Arc::new(ProviderFactory::with_builtins()),
    )
});

/// Provider identifiers known process-wide
pub fn supported_providers() -> Vec<String> {
    SHARED.0.supported_providers()
}

/// Declared feature flags of a provider registered process-wide
pub fn provider_capabilities(provider_id: &str) -> Option<ProviderFeatures> {
    SHARED
        .0
        .get_provider_config(provider_id)
        .map(|schema| schema.features)
}

/// Orchestrates provider calls
#[derive(Clone)]
pub struct Runner {
    env: Environment,
    registry: Arc<ConfigRegistry>,
    factory: Arc<ProviderFactory>,
    runtime: Arc<RuntimeConfigManager>,
}

impl Runner {
    /// Runner over the process-wide providers and runtime config
    ///
    /// Providers registered through any such runner are visible to all of
    /// them.
    pub fn new(env: Environment) -> Self {
        Self::with_components(env, Arc::clone(&SHARED.0), Arc::clone(&SHARED.1))
    }

    /// Runner over its own copy of the built-in providers
    pub fn isolated(env: Environment) -> Self {
        Self::with_components(
            env,
            Arc::new(ConfigRegistry::with_builtins()),
            Arc::new(ProviderFactory::with_builtins()),
        )
    }

    /// Runner over caller-supplied registry and factory
    pub fn with_components(
        env: Environment,
        registry: Arc<ConfigRegistry>,
        factory: Arc<ProviderFactory>,
    ) -> Self {
        Self {
            env,
            registry,
            factory,
            runtime: RuntimeConfigManager::global(),
        }
    }

    /// Use a dedicated runtime config manager instead of the global one
    pub fn with_runtime(mut self, runtime: Arc<RuntimeConfigManager>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    pub fn runtime(&self) -> &Arc<RuntimeConfigManager> {
        &self.runtime
    }

    /// Dispatch one call
    pub async fn run(&self, params: RunParams) -> DispatchResult<DispatchResponse> {
        let config = self.runtime.get_config();
        let provider_id = params.model.provider.clone();
        let span = info_span!(
            "unillm.run",
            provider = %provider_id,
            model = %params.model.model,
            request_id = %Uuid::new_v4(),
        );

        async move {
            self.dispatch(params, &config).await.map_err(|error| {
                if config.logging.enabled {
                    warn!(error = %error, "Dispatch failed");
                }
                DispatchError::wrap(provider_id.as_str(), RUN_CONTEXT, error)
            })
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        params: RunParams,
        config: &RuntimeConfig,
    ) -> DispatchResult<DispatchResponse> {
        let RunParams {
            messages,
            model,
            json_mode,
            options,
        } = params;
        let provider_id = model.provider.as_str();
        let logging = config.logging.enabled;

        self.registry.validate_provider(provider_id, &self.env)?;
        self.registry.validate_model(provider_id, &model.model)?;
        self.registry.validate_options(provider_id, &options)?;

        let provider = self
            .factory
            .create_provider_with_config(provider_id, &self.env, config)?;
        check_capabilities(provider.as_ref(), json_mode, &options)?;

        let request = ProviderRequest::new(model.model.as_str(), messages)
            .with_json_mode(json_mode)
            .with_options(self.apply_defaults(provider_id, options));

        if logging {
            debug!(
                messages = request.messages.len(),
                json_mode,
                options = ?request.options.keys().collect::<Vec<_>>(),
                "Executing provider request"
            );
        }

        let executor = RetryExecutor::new(RetryPolicy::from_settings(&config.retries))
            .with_context(format!("{}.execute", provider_id));
        let provider = provider.as_ref();
        let request = &request;
        let response = executor.execute(move || provider.execute(request)).await?;

        let response = ResponseBuilder::from_provider_response(response)
            .json_mode(json_mode)
            .build();

        if logging {
            info!(
                is_json = response.is_json,
                tool_calls = response.tool_calls.len(),
                total_tokens = response.usage.total_tokens,
                "Dispatch completed"
            );
        }

        Ok(response)
    }

    /// Fill options the caller left out from the provider's schema defaults
    fn apply_defaults(&self, provider_id: &str, mut options: Map<String, Value>) -> Map<String, Value> {
        if let Some(schema) = self.registry.get_provider_config(provider_id) {
            for (key, value) in schema.defaults {
                options.entry(key).or_insert(value);
            }
        }
        options
    }

    /// Registered provider identifiers
    pub fn supported_providers(&self) -> Vec<String> {
        self.registry.supported_providers()
    }

    /// Declared feature flags of a provider
    pub fn provider_capabilities(&self, provider_id: &str) -> Option<ProviderFeatures> {
        self.registry
            .get_provider_config(provider_id)
            .map(|schema| schema.features)
    }

    /// Deep-merge a partial update into this runner's runtime configuration
    ///
    /// Affects every runner sharing the manager, which for [`Runner::new`] is
    /// the process-wide one.
    pub fn update_runtime_config(&self, partial: &Value) -> ConfigResult<()> {
        self.runtime.update_config(partial)
    }

    /// Register a provider's schema and constructor together
    pub fn register_provider(
        &self,
        provider_id: &str,
        schema: ProviderConfigSchema,
        constructor: ProviderConstructor,
    ) {
        self.registry.register_provider_config(provider_id, schema);
        self.factory.register_provider(provider_id, constructor);
    }

    /// Compare the identifiers known to the registry and the factory
    pub fn check_registry_parity(&self) -> RegistryParity {
        let schemas = self.registry.supported_providers();
        let constructors = self.factory.get_supported_providers();

        RegistryParity {
            registry_only: schemas
                .iter()
                .filter(|id| !constructors.contains(id))
                .cloned()
                .collect(),
            factory_only: constructors
                .iter()
                .filter(|id| !schemas.contains(id))
                .cloned()
                .collect(),
        }
    }
}

/// Reject requested features the provider cannot honor
fn check_capabilities(
    provider: &dyn Provider,
    json_mode: bool,
    options: &Map<String, Value>,
) -> Result<(), ConfigurationError> {
    if json_mode && !provider.supports_json_mode() {
        return Err(ConfigurationError::new(
            provider.name(),
            format!("Provider {} does not support JSON mode", provider.name()),
        ));
    }

    if options.get("tools").is_some_and(is_truthy) && !provider.supports_tools() {
        return Err(ConfigurationError::new(
            provider.name(),
            format!("Provider {} does not support tools", provider.name()),
        ));
    }

    Ok(())
}
