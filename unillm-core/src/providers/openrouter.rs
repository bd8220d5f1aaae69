//! OpenRouter chat-completions provider over HTTP

use super::{dedupe_tool_calls, require_credentials, usage, Provider};
use crate::config::{
    Environment, ModelValidation, ProviderConfigSchema, ProviderFeatures, RuntimeConfig,
    SecretString,
};
use crate::error::{ConfigurationError, ProviderError};
use crate::json::JsonParser;
use crate::protocol::{ProviderRequest, ProviderResponse, ToolCall, Usage};
use crate::retry::TransportRetry;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const PROVIDER_ID: &str = "openrouter";

pub const API_KEY: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_KEY: &str = "OPENROUTER_BASE_URL";
pub const REFERER_KEY: &str = "OPENROUTER_REFERER";

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const USER_AGENT: &str = concat!("unillm/", env!("CARGO_PKG_VERSION"));

pub const FEATURES: ProviderFeatures = ProviderFeatures {
    json_mode: true,
    tools: true,
    streaming: true,
};

// vendor/model, optionally with a variant suffix such as ":free"
static MODEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+/[\w.:-]+$").expect("valid regex"));

/// Schema registered for this provider
pub fn config_schema() -> ProviderConfigSchema {
    ProviderConfigSchema::new()
        .with_required_env(&[API_KEY])
        .with_optional_env(&[BASE_URL_KEY, REFERER_KEY])
        .with_default("temperature", json!(0.7))
        .with_features(FEATURES)
        .with_model_validation(ModelValidation {
            min_length: Some(3),
            max_length: Some(128),
            pattern: Some(MODEL_PATTERN.clone()),
        })
}

/// Failure of a single HTTP exchange, before it is mapped to a provider error
#[derive(Debug, Error)]
pub enum HttpFailure {
    /// The API answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

pub struct OpenRouterProvider {
    client: Client,
    api_key: SecretString,
    endpoint: String,
    referer: Option<String>,
    transport_retry: TransportRetry,
}

impl OpenRouterProvider {
    /// Build from the environment; the request timeout comes from `runtime`
    pub fn from_env(env: &Environment, runtime: &RuntimeConfig) -> Result<Self, ConfigurationError> {
        require_credentials(PROVIDER_ID, env, &[API_KEY])?;

        let api_key = env.secret(API_KEY).cloned().ok_or_else(|| {
            ConfigurationError::new(PROVIDER_ID, format!("{} must be a secret value", API_KEY))
        })?;

        let base_url = env
            .secret(BASE_URL_KEY)
            .map(|url| url.expose_secret().to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Url::parse(&base_url).map_err(|e| {
            ConfigurationError::new(
                PROVIDER_ID,
                format!("{} is not a valid URL: {}", BASE_URL_KEY, e),
            )
        })?;

        let referer = env
            .secret(REFERER_KEY)
            .map(|referer| referer.expose_secret().to_string());

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_millis(runtime.timeout_ms))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ConfigurationError::new(PROVIDER_ID, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            referer,
            transport_retry: TransportRetry::default(),
        })
    }

    /// Override the transport-level retry around each HTTP exchange
    pub fn with_transport_retry(mut self, transport_retry: TransportRetry) -> Self {
        self.transport_retry = transport_retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Chat-completions body
    ///
    /// Tool declarations switch on automatic tool choice and suppress the
    /// JSON response format, which the API rejects in combination.
    fn build_payload(request: &ProviderRequest) -> Value {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(request.model));
        payload.insert("messages".to_string(), json!(request.messages));

        for (key, value) in &request.options {
            payload.insert(key.clone(), value.clone());
        }

        if request.has_tools() {
            payload
                .entry("tool_choice")
                .or_insert_with(|| json!("auto"));
        } else if request.json_mode {
            payload.insert(
                "response_format".to_string(),
                json!({ "type": "json_object" }),
            );
        }

        Value::Object(payload)
    }

    /// One HTTP exchange; `None` when the API answered with an empty body
    async fn send(&self, payload: &Value) -> Result<Option<Value>, HttpFailure> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(payload);

        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            // An unreadable error body still reports the status
            let body = response.text().await.unwrap_or_default();
            return Err(HttpFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;

        if body.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&body)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }
}

fn extract_content(raw: &Value) -> String {
    raw.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn extract_tool_calls(raw: &Value) -> Vec<ToolCall> {
    let calls = raw
        .pointer("/choices/0/message/tool_calls")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().enumerate().map(normalize_tool_call).collect())
        .unwrap_or_default();

    dedupe_tool_calls(calls)
}

/// Native entries may omit `id` or `type`, or send `arguments` as an object
fn normalize_tool_call((index, entry): (usize, &Value)) -> ToolCall {
    let function = entry.get("function").unwrap_or(entry);
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("tool-call-{}", index));
    let name = function.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = match function.get("arguments") {
        Some(Value::String(args)) => args.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => JsonParser::stringify(other, false),
    };

    ToolCall::function(id, name, arguments)
}

fn extract_usage(raw: &Value) -> Usage {
    let count = |field: &str| {
        raw.get("usage")
            .and_then(|u| u.get(field))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    usage(
        count("prompt_tokens"),
        count("completion_tokens"),
        count("total_tokens"),
    )
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn execute(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let payload = Self::build_payload(request);
        let payload = &payload;
        let model = request.model.as_str();

        debug!(
            provider = PROVIDER_ID,
            model,
            endpoint = %self.endpoint,
            api_key = %self.api_key.partial_redact(),
            "Sending chat completion request"
        );

        let raw = match self.transport_retry.run(move || self.send(payload)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(ProviderError::new(PROVIDER_ID, "No response from API")),
            Err(failure) => {
                let error = match &failure {
                    HttpFailure::Status { status, body } => ProviderError::new(
                        PROVIDER_ID,
                        format!("API Error ({}): {}. Model: {}", status, body, model),
                    )
                    .with_status(*status),
                    other => {
                        ProviderError::new(PROVIDER_ID, format!("execution failed: {}", other))
                    }
                };
                return Err(error.with_cause(failure));
            }
        };

        Ok(ProviderResponse {
            content: extract_content(&raw),
            tool_calls: extract_tool_calls(&raw),
            usage: extract_usage(&raw),
            raw,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    fn request() -> ProviderRequest {
        ProviderRequest::new("openai/gpt-4o-mini", vec![Message::user("hi")])
    }

    fn env() -> Environment {
        Environment::new().with_secret(API_KEY, "sk-or-test-123456789")
    }

    #[test]
    fn test_from_env_requires_api_key() {
        let err = OpenRouterProvider::from_env(&Environment::new(), &RuntimeConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.provider, "openrouter");
        assert_eq!(err.message, "Missing required environment variables: OPENROUTER_API_KEY");
    }

    #[test]
    fn test_endpoint_from_base_url() {
        let provider = OpenRouterProvider::from_env(&env(), &RuntimeConfig::default()).unwrap();
        assert_eq!(provider.endpoint(), "https://openrouter.ai/api/v1/chat/completions");

        let custom = env().with_secret(BASE_URL_KEY, "http://127.0.0.1:9999/v1/");
        let provider = OpenRouterProvider::from_env(&custom, &RuntimeConfig::default()).unwrap();
        assert_eq!(provider.endpoint(), "http://127.0.0.1:9999/v1/chat/completions");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let bad = env().with_secret(BASE_URL_KEY, "not a url");
        let err = OpenRouterProvider::from_env(&bad, &RuntimeConfig::default())
            .err()
            .unwrap();
        assert!(err.message.starts_with("OPENROUTER_BASE_URL is not a valid URL"));
    }

    #[test]
    fn test_payload_json_mode() {
        let payload = OpenRouterProvider::build_payload(
            &request().with_json_mode(true).with_option("temperature", json!(0.2)),
        );

        assert_eq!(payload["model"], "openai/gpt-4o-mini");
        assert_eq!(payload["temperature"], json!(0.2));
        assert_eq!(payload["response_format"], json!({"type": "json_object"}));
        assert!(payload.get("tool_choice").is_none());
    }

    #[test]
    fn test_payload_tools_suppress_response_format() {
        let tools = json!([{"type": "function", "function": {"name": "lookup"}}]);
        let payload = OpenRouterProvider::build_payload(
            &request().with_json_mode(true).with_option("tools", tools.clone()),
        );

        assert_eq!(payload["tools"], tools);
        assert_eq!(payload["tool_choice"], "auto");
        assert!(payload.get("response_format").is_none());
    }

    #[test]
    fn test_payload_keeps_explicit_tool_choice() {
        let payload = OpenRouterProvider::build_payload(
            &request()
                .with_option("tools", json!([{"type": "function"}]))
                .with_option("tool_choice", json!("required")),
        );
        assert_eq!(payload["tool_choice"], "required");
    }

    #[test]
    fn test_extract_fields() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": "Done",
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "search", "arguments": "{\"q\":1}"}},
                        {"id": "b", "type": "function", "function": {"name": "search", "arguments": "{\"q\":2}"}},
                        {"id": "c", "type": "function", "function": {"name": "fetch", "arguments": "{}"}}
                    ]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });

        assert_eq!(extract_content(&raw), "Done");

        let calls = extract_tool_calls(&raw);
        let ids: Vec<_> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let usage = extract_usage(&raw);
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_extract_loose_tool_call_shapes() {
        let raw = json!({
            "choices": [{
                "message": {
                    "tool_calls": [
                        {"id": "call_1", "function": {"name": "search", "arguments": "{\"q\":1}"}},
                        {"id": "call_2", "type": "function", "function": {"name": "fetch", "arguments": {"url": "x"}}},
                        {"type": "function", "function": {"name": "notify"}}
                    ]
                }
            }]
        });

        let calls = extract_tool_calls(&raw);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].tool_type, "function");
        assert_eq!(calls[1].function.arguments, r#"{"url":"x"}"#);
        assert_eq!(calls[2].id, "tool-call-2");
        assert_eq!(calls[2].function.name, "notify");
        assert_eq!(calls[2].function.arguments, "{}");
    }

    #[test]
    fn test_extract_missing_fields() {
        let raw = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(extract_content(&raw), "");
        assert!(extract_tool_calls(&raw).is_empty());
        assert_eq!(extract_usage(&raw), Usage::default());
    }
}
