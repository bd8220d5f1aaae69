//! Uniform result record assembled from provider output

use crate::json::JsonParser;
use crate::protocol::{ProviderResponse, ToolCall, Usage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a dispatched call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    /// Generated text
    pub content: String,

    /// Whether the content should be treated as a JSON payload
    pub is_json: bool,

    /// Tool/function invocations requested by the model
    pub tool_calls: Vec<ToolCall>,

    /// Untouched native payload from the provider
    pub raw: Value,

    pub usage: Usage,
}

impl DispatchResponse {
    /// Leniently recover JSON from the content
    ///
    /// Computed on every call; `is_json` is passed as the expect-JSON hint.
    pub fn json(&self) -> Option<Value> {
        JsonParser::parse(&self.content, self.is_json)
    }

    /// Recover JSON and deserialize it into `T`
    pub fn json_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.json().and_then(|value| serde_json::from_value(value).ok())
    }
}

/// Builder accumulating the pieces of a [`DispatchResponse`]
#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    content: String,
    tool_calls: Vec<ToolCall>,
    raw: Value,
    usage: Usage,
    json_mode: bool,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from a provider response
    pub fn from_provider_response(response: ProviderResponse) -> Self {
        Self::new()
            .content(response.content)
            .tool_calls(response.tool_calls)
            .raw(response.raw)
            .usage(response.usage)
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    /// Finalize the response
    ///
    /// Any tool call forces `is_json` off; otherwise JSON mode or content
    /// opening with `{` turns it on.
    pub fn build(self) -> DispatchResponse {
        let is_json = self.tool_calls.is_empty()
            && (self.json_mode || self.content.trim().starts_with('{'));

        DispatchResponse {
            content: self.content,
            is_json,
            tool_calls: self.tool_calls,
            raw: self.raw,
            usage: self.usage,
        }
    }
}
