//! Dispatch Demo - binding provider, JSON recovery and error wrapping
//!
//! Runs entirely in-process against a scripted AI binding, so no credentials
//! are needed:
//! - plain text and JSON-mode calls through the runner
//! - lenient JSON recovery from fenced model output
//! - runtime retry tuning and the tagged error surface
//!
//! Run with: cargo run --example dispatch_demo

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use unillm_core::config::{AiBinding, BindingError, LoggingSettings, RuntimeConfigManager};
use unillm_core::logging::init_tracing;
use unillm_core::{Environment, Message, ModelSelector, RunParams, Runner};

const MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Answers based on the last user message
struct ScriptedBinding;

#[async_trait]
impl AiBinding for ScriptedBinding {
    async fn run(&self, _model: &str, payload: Value) -> Result<Value, BindingError> {
        let prompt = payload["messages"]
            .as_array()
            .and_then(|messages| messages.last())
            .and_then(|message| message["content"].as_str())
            .unwrap_or_default();

        match prompt {
            "rate this" => Ok(json!({
                "response": "Sure!\n```json\n{\"score\": 8, \"reason\": \"clear\"}\n```"
            })),
            "fail" => Err(BindingError::new("model rejected the input")),
            other => Ok(json!({ "response": format!("echo: {}", other) })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Rating {
    score: u8,
    reason: String,
}

fn params(prompt: &str) -> RunParams {
    RunParams::new(
        vec![Message::system("Be brief."), Message::user(prompt)],
        ModelSelector::new("cloudflare", MODEL),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&LoggingSettings::default());

    let runner = Runner::new(Environment::new().with_binding("AI", Arc::new(ScriptedBinding)))
        .with_runtime(Arc::new(RuntimeConfigManager::new()));

    println!("Providers: {}", runner.supported_providers().join(", "));
    if let Some(features) = runner.provider_capabilities("cloudflare") {
        println!(
            "cloudflare: json_mode={} tools={} streaming={}",
            features.json_mode, features.tools, features.streaming
        );
    }

    // Plain text
    let response = runner.run(params("hello there")).await?;
    println!("\nPlain: {} (is_json={})", response.content, response.is_json);

    // Fenced JSON recovered on demand
    let response = runner.run(params("rate this")).await?;
    if let Some(rating) = response.json_as::<Rating>() {
        println!("Rating: {} because {}", rating.score, rating.reason);
    }

    // Errors come back tagged with provider and context
    runner.update_runtime_config(&json!({"retries": {"maxAttempts": 0}}))?;
    match runner.run(params("fail")).await {
        Ok(_) => println!("unexpected success"),
        Err(err) => println!("\nError ({:?}): {}", err.kind(), err),
    }

    let err = runner
        .run(params("hi").with_option("temperature", json!(3.5)))
        .await
        .err();
    if let Some(err) = err {
        println!("Validation: {}", err);
    }

    Ok(())
}
