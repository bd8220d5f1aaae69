//! Error kinds surfaced by the dispatch pipeline
//!
//! Two kinds exist, both tagged with the provider they originate from:
//! - [`ConfigurationError`] for local, pre-execution failures (credentials,
//!   unknown provider, malformed model or options, unsupported capability)
//! - [`ProviderError`] for execution-time failures, optionally carrying an
//!   HTTP status and the underlying cause
//!
//! [`DispatchError`] is what the [`Runner`](crate::runner::Runner) hands back.
//! Its `Run` variant is the outer display wrap; the typed inner error stays
//! reachable through [`DispatchError::inner`] and `source()`.

use crate::retry::Retryable;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed cause preserved on provider errors
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Local validation or capability failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// Provider the failure is attributed to
    pub provider: String,

    /// Human-readable description
    pub message: String,
}

impl ConfigurationError {
    /// Create a new configuration error
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Error for credential keys absent from the environment
    pub fn missing_credentials(provider: impl Into<String>, missing: &[&str]) -> Self {
        Self::new(
            provider,
            format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ),
        )
    }

    /// Error for a provider identifier nobody registered
    pub fn unknown_provider(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        let message = format!("Unknown provider: {}", provider);
        Self::new(provider, message)
    }
}

/// Execution-time failure reported by a provider
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider that failed
    pub provider: String,

    /// Human-readable description
    pub message: String,

    /// HTTP (or HTTP-like) status code, when the backend reported one
    pub status: Option<u16>,

    /// The raw underlying failure
    #[source]
    pub cause: Option<BoxError>,
}

impl ProviderError {
    /// Create a new provider error without status or cause
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            status: None,
            cause: None,
        }
    }

    /// Attach a status code
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the originating failure
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Whether a `reqwest` network failure sits anywhere in the cause chain
    fn has_transport_cause(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = match self.cause.as_deref() {
            Some(cause) => Some(cause),
            None => None,
        };

        while let Some(err) = current {
            if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
                if reqwest_err.is_connect() || reqwest_err.is_timeout() || reqwest_err.is_request()
                {
                    return true;
                }
            }
            current = err.source();
        }

        false
    }
}

impl Retryable for ProviderError {
    fn status_code(&self) -> Option<u16> {
        self.status
    }

    fn is_network_failure(&self) -> bool {
        self.has_transport_cause()
    }
}

impl Retryable for ConfigurationError {}

/// Which of the two error kinds a [`DispatchError`] carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Provider,
}

/// Error returned from the public dispatch surface
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Outer wrap applied once by the runner
    #[error("[{}] ({}) {}", .provider.to_uppercase(), .context, .source)]
    Run {
        provider: String,
        context: String,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    /// Wrap an error with provider and context tags
    pub fn wrap(provider: impl Into<String>, context: impl Into<String>, error: DispatchError) -> Self {
        DispatchError::Run {
            provider: provider.into(),
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// The innermost typed error, looking through any `Run` wrapping
    pub fn inner(&self) -> &DispatchError {
        match self {
            DispatchError::Run { source, .. } => source.inner(),
            other => other,
        }
    }

    /// Kind of the underlying error
    pub fn kind(&self) -> ErrorKind {
        match self.inner() {
            DispatchError::Provider(_) => ErrorKind::Provider,
            _ => ErrorKind::Configuration,
        }
    }

    /// Provider the error is attributed to
    pub fn provider(&self) -> &str {
        match self {
            DispatchError::Configuration(err) => &err.provider,
            DispatchError::Provider(err) => &err.provider,
            DispatchError::Run { provider, .. } => provider,
        }
    }

    /// Status code of an underlying provider error
    pub fn status(&self) -> Option<u16> {
        match self.inner() {
            DispatchError::Provider(err) => err.status,
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_provider(&self) -> bool {
        self.kind() == ErrorKind::Provider
    }
}

impl Retryable for DispatchError {
    fn status_code(&self) -> Option<u16> {
        self.status()
    }

    fn is_network_failure(&self) -> bool {
        match self.inner() {
            DispatchError::Provider(err) => err.is_network_failure(),
            _ => false,
        }
    }
}
