//! Provider abstraction and built-in backends
//!
//! Every backend implements [`Provider`]. Behavior shared between backends
//! lives in free helpers ([`require_credentials`], [`provider_error`],
//! [`usage`], [`dedupe_tool_calls`]) that each implementation calls directly.

pub mod factory;
pub mod openrouter;
pub mod workers_ai;

use crate::config::{Environment, ProviderConfigSchema};
use crate::error::{BoxError, ConfigurationError, ProviderError};
use crate::protocol::{ProviderRequest, ProviderResponse, ToolCall, Usage};
use async_trait::async_trait;
use std::collections::HashSet;

pub use factory::{constructor, ProviderConstructor, ProviderFactory};
pub use openrouter::OpenRouterProvider;
pub use workers_ai::WorkersAiProvider;

/// Core provider trait that all backends must implement
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider identifier
    fn name(&self) -> &str;

    /// Run one request against the backend
    async fn execute(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Whether structured JSON output can be forced
    fn supports_json_mode(&self) -> bool;

    /// Whether tool declarations are accepted
    fn supports_tools(&self) -> bool;

    /// Whether the backend can stream; the pipeline itself never streams
    fn supports_streaming(&self) -> bool {
        false
    }
}

/// A provider shipped with the crate: identifier, schema and constructor
pub struct BuiltinProvider {
    pub id: &'static str,
    pub schema: ProviderConfigSchema,
    pub constructor: ProviderConstructor,
}

/// Built-in providers; both registries are derived from this list
pub fn builtins() -> Vec<BuiltinProvider> {
    vec![
        BuiltinProvider {
            id: workers_ai::PROVIDER_ID,
            schema: workers_ai::config_schema(),
            constructor: constructor(|env, _runtime| {
                Ok(Box::new(WorkersAiProvider::from_env(env)?))
            }),
        },
        BuiltinProvider {
            id: openrouter::PROVIDER_ID,
            schema: openrouter::config_schema(),
            constructor: constructor(|env, runtime| {
                Ok(Box::new(OpenRouterProvider::from_env(env, runtime)?))
            }),
        },
    ]
}

/// Fail with every absent credential key, in declared order
pub fn require_credentials(
    provider: &str,
    env: &Environment,
    keys: &[&str],
) -> Result<(), ConfigurationError> {
    let missing = env.missing_keys(keys);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError::missing_credentials(provider, &missing))
    }
}

/// Build a provider error tagged with the provider's identity
pub fn provider_error(
    provider: &str,
    message: impl Into<String>,
    status: Option<u16>,
    cause: Option<BoxError>,
) -> ProviderError {
    ProviderError {
        provider: provider.to_string(),
        message: message.into(),
        status,
        cause,
    }
}

pub fn usage(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Usage {
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    }
}

/// Keep the first tool call per function name, preserving order
pub fn dedupe_tool_calls(tool_calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    tool_calls
        .into_iter()
        .filter(|call| seen.insert(call.function.name.clone()))
        .collect()
}
