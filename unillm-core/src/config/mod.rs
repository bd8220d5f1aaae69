//! Configuration module for unillm
//!
//! Static per-provider metadata ([`ConfigRegistry`]), the mutable runtime
//! tuning shared by every call ([`RuntimeConfigManager`]) and the credential
//! environment handed to providers ([`Environment`]).

mod env;
mod error;
mod registry;
mod runtime;
mod secrets;

pub use env::{AiBinding, BindingError, EnvValue, Environment};
pub use error::{ConfigError, ConfigResult};
pub use registry::{ConfigRegistry, ModelValidation, ProviderConfigSchema, ProviderFeatures};
pub use runtime::{
    deep_merge, CacheSettings, LoggingSettings, RetrySettings, RuntimeConfig,
    RuntimeConfigManager,
};
pub use secrets::SecretString;
