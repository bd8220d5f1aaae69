//! Retry policy and backoff execution for provider operations
//!
//! Two facilities live here:
//! - [`TransportRetry`]: the low-level helper each provider wraps around its
//!   transport call. Retries every failure, linear delay, no jitter, no cap.
//! - [`RetryExecutor`]: the policy-driven executor the runner wraps around a
//!   whole provider call. Exponential backoff with jitter, a delay ceiling and
//!   explicit classification of retryable failures.

use crate::config::RetrySettings;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Message fragments that mark a failure as transient
pub const DEFAULT_RETRYABLE_MESSAGES: &[&str] =
    &["1031", "500", "502", "503", "504", "timeout", "network"];

/// Status codes that mark a failure as transient
pub const DEFAULT_RETRYABLE_STATUS_CODES: &[u16] = &[500, 502, 503, 504, 429];

/// Classification hooks for the policy-driven executor
///
/// The executor inspects the rendered message, an optional status code and
/// whether the failure came from the network transport itself.
pub trait Retryable: fmt::Display {
    /// HTTP-like status reported with the failure
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Whether the failure is a transport-level network error
    fn is_network_failure(&self) -> bool {
        false
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Ceiling applied to every computed delay (milliseconds)
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    pub exponential_base: f64,

    /// Upper bound of the random extra fraction added to each delay
    pub jitter_factor: f64,

    /// Case-insensitive message fragments considered retryable
    pub retryable_messages: Vec<String>,

    /// Status codes considered retryable
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter_factor: 0.1,
            retryable_messages: DEFAULT_RETRYABLE_MESSAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry count and default backoff
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Build a policy from the runtime retry settings
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_attempts,
            initial_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            ..Default::default()
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Total number of attempts, the initial one included
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay before the retry following `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32);

        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_factor)
        } else {
            0.0
        };

        let delay = (base_delay * (1.0 + jitter)).min(self.max_delay_ms as f64);
        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Whether a failure is transient under this policy
    pub fn is_retryable<E: Retryable + ?Sized>(&self, error: &E) -> bool {
        let message = error.to_string().to_lowercase();
        if self
            .retryable_messages
            .iter()
            .any(|pattern| message.contains(&pattern.to_lowercase()))
        {
            return true;
        }

        if let Some(status) = error.status_code() {
            if self.retryable_status_codes.contains(&status) {
                return true;
            }
        }

        error.is_network_failure()
    }

    /// Check if we should retry based on the error and the 0-based attempt index
    pub fn should_retry<E: Retryable + ?Sized>(&self, error: &E, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        self.is_retryable(error)
    }
}

/// Executor for policy-driven retries
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    context: Option<String>,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            context: None,
        }
    }

    /// Label used in retry warnings; without one retries are silent
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with retry logic
    ///
    /// Attempts run strictly one after another. The last failure is returned
    /// unchanged once attempts run out or a failure is classified as permanent.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let total_attempts = self.policy.total_attempts();
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.policy.should_retry(&error, attempt) {
                        return Err(error);
                    }

                    let delay = self.policy.calculate_delay(attempt);
                    if let Some(context) = &self.context {
                        warn!(
                            context = %context,
                            attempt = attempt + 1,
                            max_attempts = total_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying after failure"
                        );
                    }

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Low-level retry helper wrapped around a single transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportRetry {
    /// Total attempts, the initial one included
    pub max_attempts: u32,

    /// Delay unit; the wait after attempt `i` is `base_delay * (i + 1)`
    pub base_delay: Duration,
}

impl Default for TransportRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl TransportRetry {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Run `operation`, retrying every failure until attempts run out
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) if attempt + 1 >= max_attempts => return Err(error),
                Err(error) => {
                    let delay = self.base_delay * (attempt + 1);
                    debug!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transport call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestError {
        message: String,
        status: Option<u16>,
    }

    impl TestError {
        fn message(message: &str) -> Self {
            Self {
                message: message.to_string(),
                status: None,
            }
        }

        fn status(status: u16) -> Self {
            Self {
                message: "request rejected".to_string(),
                status: Some(status),
            }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn status_code(&self) -> Option<u16> {
            self.status
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 10_000);
        assert_eq!(policy.exponential_base, 2.0);
        assert!(policy.retryable_messages.contains(&"1031".to_string()));
        assert_eq!(policy.retryable_status_codes, vec![500, 502, 503, 504, 429]);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let policy = no_jitter();

        assert_eq!(policy.calculate_delay(0).as_millis(), 1000);
        assert_eq!(policy.calculate_delay(1).as_millis(), 2000);
        assert_eq!(policy.calculate_delay(2).as_millis(), 4000);
        assert_eq!(policy.calculate_delay(3).as_millis(), 8000);
        // 16s capped at the ceiling
        assert_eq!(policy.calculate_delay(4).as_millis(), 10_000);
    }

    #[test]
    fn test_jitter_only_adds_delay() {
        let policy = RetryPolicy::default();

        for _ in 0..50 {
            let delay = policy.calculate_delay(1).as_millis();
            assert!(delay >= 2000, "delay {} below base", delay);
            assert!(delay <= 2200, "delay {} above 10% jitter", delay);
        }
    }

    #[test]
    fn test_classification() {
        let policy = RetryPolicy::default();

        assert!(policy.is_retryable(&TestError::message("Gateway TIMEOUT while waiting")));
        assert!(policy.is_retryable(&TestError::message("AiError: 1031 capacity")));
        assert!(policy.is_retryable(&TestError::message("HTTP 503 from upstream")));
        assert!(policy.is_retryable(&TestError::status(429)));
        assert!(!policy.is_retryable(&TestError::status(400)));
        assert!(!policy.is_retryable(&TestError::message("invalid api key")));
    }

    #[test]
    fn test_classification_overrides() {
        let policy = RetryPolicy {
            retryable_messages: vec!["overloaded".to_string()],
            retryable_status_codes: vec![409],
            ..Default::default()
        };

        assert!(policy.is_retryable(&TestError::message("Model Overloaded")));
        assert!(policy.is_retryable(&TestError::status(409)));
        assert!(!policy.is_retryable(&TestError::message("timeout")));
        assert!(!policy.is_retryable(&TestError::status(429)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_retries_rate_limit_then_succeeds() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = Cell::new(0);

        let result = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt <= 2 {
                        Err(TestError::status(429))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_stops_on_permanent_failure() {
        let executor = RetryExecutor::new(RetryPolicy::default()).with_context("test");
        let calls = Cell::new(0);

        let result: Result<(), TestError> = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Err(TestError::message("invalid request body")) }
            })
            .await;

        assert_eq!(result.unwrap_err().message, "invalid request body");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_returns_last_error_when_exhausted() {
        let executor = RetryExecutor::new(RetryPolicy::new(2));
        let calls = Cell::new(0);

        let result: Result<(), TestError> = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move { Err(TestError::message(&format!("502 attempt {}", attempt))) }
            })
            .await;

        assert_eq!(result.unwrap_err().message, "502 attempt 3");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_retry_linear_delay() {
        let retry = TransportRetry::default();
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();

        let result = retry
            .run(|| {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 3 {
                        Err("flaky")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        // 1000ms after the first failure, 2000ms after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_retry_gives_up_after_max_attempts() {
        let retry = TransportRetry::new(2, Duration::from_millis(10));
        let calls = Cell::new(0);

        let result: Result<(), &str> = retry
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err("down") }
            })
            .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.get(), 2);
    }
}
