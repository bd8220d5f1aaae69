//! Unillm Core Library
//!
//! One request/response contract over several remote LLM backends: provider
//! validation and construction, capability checks, retry with backoff,
//! response normalization and lenient JSON recovery from model output.
//!
//! ```no_run
//! use unillm_core::{Environment, Message, ModelSelector, RunParams, Runner};
//!
//! # async fn demo() -> Result<(), unillm_core::DispatchError> {
//! let runner = Runner::new(Environment::from_process_env(&["OPENROUTER_API_KEY"]));
//! let response = runner
//!     .run(RunParams::new(
//!         vec![Message::user("Say hello")],
//!         ModelSelector::new("openrouter", "openai/gpt-4o-mini"),
//!     ))
//!     .await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod json;
pub mod logging;
pub mod protocol;
pub mod providers;
pub mod response;
pub mod retry;
pub mod runner;

pub use config::{
    AiBinding, BindingError, ConfigError, ConfigRegistry, EnvValue, Environment,
    ProviderConfigSchema, ProviderFeatures, RuntimeConfig, RuntimeConfigManager, SecretString,
};
pub use error::{ConfigurationError, DispatchError, DispatchResult, ErrorKind, ProviderError};
pub use json::JsonParser;
pub use protocol::{Message, MessageRole, ModelSelector, ToolCall, Usage};
pub use providers::{Provider, ProviderFactory};
pub use response::DispatchResponse;
pub use retry::{RetryExecutor, RetryPolicy};
pub use runner::{RunParams, Runner};

/// Returns the version of the Unillm Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
