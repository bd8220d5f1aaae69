//! Edge-runtime AI binding provider
//!
//! Models run through a bound callable stored in the environment under
//! [`BINDING_KEY`]. The binding answers with either a bare string or an object
//! carrying `response` and optionally `tool_calls`. Token usage is never
//! reported.

use super::{require_credentials, Provider};
use crate::config::{AiBinding, Environment, ModelValidation, ProviderConfigSchema, ProviderFeatures};
use crate::error::{ConfigurationError, ProviderError};
use crate::json::JsonParser;
use crate::protocol::{ProviderRequest, ProviderResponse, ToolCall, Usage};
use crate::retry::TransportRetry;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

pub const PROVIDER_ID: &str = "cloudflare";

/// Environment key holding the AI binding
pub const BINDING_KEY: &str = "AI";

pub const FEATURES: ProviderFeatures = ProviderFeatures {
    json_mode: true,
    tools: true,
    streaming: false,
};

// e.g. "@cf/meta/llama-3.1-8b-instruct"
static MODEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9@][A-Za-z0-9@._/:-]*$").expect("valid regex"));

/// Schema registered for this provider
pub fn config_schema() -> ProviderConfigSchema {
    ProviderConfigSchema::new()
        .with_required_env(&[BINDING_KEY])
        .with_default("max_tokens", json!(2048))
        .with_features(FEATURES)
        .with_model_validation(ModelValidation {
            min_length: Some(1),
            max_length: Some(256),
            pattern: Some(MODEL_PATTERN.clone()),
        })
}

pub struct WorkersAiProvider {
    binding: Arc<dyn AiBinding>,
    transport_retry: TransportRetry,
}

impl WorkersAiProvider {
    pub fn new(binding: Arc<dyn AiBinding>) -> Self {
        Self {
            binding,
            transport_retry: TransportRetry::default(),
        }
    }

    /// Build from an environment holding the binding under [`BINDING_KEY`]
    pub fn from_env(env: &Environment) -> Result<Self, ConfigurationError> {
        require_credentials(PROVIDER_ID, env, &[BINDING_KEY])?;

        let binding = env.binding(BINDING_KEY).ok_or_else(|| {
            ConfigurationError::new(PROVIDER_ID, format!("{} must be a bound AI callable", BINDING_KEY))
        })?;

        Ok(Self::new(binding))
    }

    /// Override the transport-level retry around each binding call
    pub fn with_transport_retry(mut self, transport_retry: TransportRetry) -> Self {
        self.transport_retry = transport_retry;
        self
    }

    fn build_payload(request: &ProviderRequest) -> Value {
        let mut payload = Map::new();
        payload.insert("messages".to_string(), json!(request.messages));

        for (key, value) in &request.options {
            payload.insert(key.clone(), value.clone());
        }

        if request.json_mode {
            payload.insert(
                "response_format".to_string(),
                json!({ "type": "json_object" }),
            );
        }

        Value::Object(payload)
    }
}

/// Text of a binding response
///
/// A bare string is the content; an object contributes its `response` field,
/// JSON-encoded unless already a string. Anything else yields nothing.
fn extract_content(raw: &Value) -> String {
    match raw {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("response") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => JsonParser::stringify(other, false),
        },
        _ => String::new(),
    }
}

fn extract_tool_calls(raw: &Value) -> Vec<ToolCall> {
    let Some(entries) = raw.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = match entry.get("arguments") {
                Some(Value::String(args)) => args.clone(),
                Some(other) => JsonParser::stringify(other, false),
                None => "{}".to_string(),
            };
            ToolCall::function(format!("tool-call-{}", index), name, arguments)
        })
        .collect()
}

#[async_trait]
impl Provider for WorkersAiProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn execute(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let payload = Self::build_payload(request);
        let model = request.model.as_str();
        let binding = &self.binding;
        let payload = &payload;

        debug!(provider = PROVIDER_ID, model, "Invoking AI binding");

        let raw = self
            .transport_retry
            .run(move || binding.run(model, payload.clone()))
            .await
            .map_err(|e| {
                ProviderError::new(PROVIDER_ID, format!("execution failed: {}", e)).with_cause(e)
            })?;

        Ok(ProviderResponse {
            content: extract_content(&raw),
            tool_calls: extract_tool_calls(&raw),
            raw,
            usage: Usage::default(),
        })
    }

    fn supports_json_mode(&self) -> bool {
        FEATURES.json_mode
    }

    fn supports_tools(&self) -> bool {
        FEATURES.tools
    }

    fn supports_streaming(&self) -> bool {
        FEATURES.streaming
    }
}
