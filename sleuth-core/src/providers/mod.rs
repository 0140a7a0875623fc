//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - OpenAI-compatible APIs (OpenAI, Azure, Ollama, vLLM, LM Studio)
//! - Anthropic Messages API (Claude models)
//!
//! Use `create_provider()` to instantiate the appropriate provider based on config.
//! The retry helpers here are shared with the search collaborator.

pub mod anthropic;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::{LlmError, SearchError};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Errors that can be retried with backoff.
pub trait Transient: std::fmt::Display + Sized {
    /// Whether another attempt might succeed.
    fn is_transient(&self) -> bool;

    /// Server-requested delay before the next attempt, if any.
    fn retry_after_secs(&self) -> Option<u64> {
        None
    }

    /// Wrap the last error once the retry budget is spent.
    fn exhausted(attempts: u32, last: Self) -> Self;
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
        )
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        LlmError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }
}

impl Transient for SearchError {
    fn is_transient(&self) -> bool {
        match self {
            SearchError::Request { .. } | SearchError::Timeout { .. } => true,
            SearchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        SearchError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Permanent errors return immediately. When every attempt fails with a transient
/// error the last one is wrapped by [`Transient::exhausted`].
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= config.max_retries => {
                if config.max_retries == 0 {
                    return Err(e);
                }
                return Err(E::exhausted(attempt + 1, e));
            }
            Err(e) => {
                let backoff_ms = compute_backoff(config, attempt, e.retry_after_secs());
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Compute backoff delay, respecting a server-provided retry-after.
fn compute_backoff(config: &RetryConfig, attempt: u32, retry_after_secs: Option<u64>) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    match retry_after_secs {
        Some(secs) => (secs * 1000).max(computed),
        None => computed,
    }
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Add up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap pseudo-random value in [0, 1) from the clock's sub-second nanos.
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Decorates a provider with [`with_retry`].
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    retry: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn run(&self, prompt: &str) -> Result<String, LlmError> {
        with_retry(&self.retry, || self.inner.run(prompt)).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Map a transport-level reqwest failure onto the provider error taxonomy.
pub(crate) fn map_send_error(err: reqwest::Error, timeout_secs: u64, provider: &str) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout { timeout_secs }
    } else if err.is_connect() || err.is_request() {
        LlmError::Connection {
            message: format!("{}: {}", provider, err),
        }
    } else {
        LlmError::ApiRequest {
            message: format!("Request to {} failed: {}", provider, err),
        }
    }
}

/// Build the shared HTTP client with the per-request timeout applied.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::Connection {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// Resolve the API key for a provider from its configured environment variable.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    crate::config::env_credential(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
        provider: format!("{}: env var '{}' not set", config.provider, config.api_key_env),
    })
}

/// The key a provider should send. Local endpoints work without one and get
/// the placeholder `"local"`.
fn provider_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    match resolve_api_key(config) {
        Ok(key) => Ok(key),
        Err(_) if OpenAiCompatibleProvider::is_local_url(config.base_url.as_deref()) => {
            tracing::debug!("No API key set for local provider; using placeholder bearer token");
            Ok("local".to_string())
        }
        Err(e) => Err(e),
    }
}

/// Create a single, non-retrying LLM provider with a resolved key.
fn create_single_provider(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new_with_key(config, api_key)?)),
        _ => Ok(Arc::new(OpenAiCompatibleProvider::new_with_key(
            config, api_key,
        )?)),
    }
}

/// Create an LLM provider based on the configuration.
///
/// Routes to the appropriate provider implementation:
/// - `"anthropic"` → `AnthropicProvider` (native Anthropic Messages API)
/// - Everything else → `OpenAiCompatibleProvider` (OpenAI, Azure, Ollama, local, etc.)
///
/// The result retries transient failures according to `config.retry`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let api_key = provider_api_key(config)?;
    let provider = create_single_provider(config, api_key)?;
    tracing::info!(provider = %config.provider, model = %config.model, "LLM provider ready");
    Ok(Arc::new(RetryingProvider::new(provider, config.retry.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn test_config(provider: &str, key_env: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            model: "test-model".to_string(),
            api_key_env: key_env.to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_create_provider_openai() {
        unsafe { std::env::set_var("SLEUTH_TEST_KEY_OPENAI", "test-key-123") };
        let provider = create_provider(&test_config("openai", "SLEUTH_TEST_KEY_OPENAI")).unwrap();
        assert_eq!(provider.model_name(), "test-model");
    }

    #[test]
    fn test_create_provider_anthropic() {
        unsafe { std::env::set_var("SLEUTH_TEST_KEY_ANTHROPIC", "test-key-456") };
        let provider =
            create_provider(&test_config("anthropic", "SLEUTH_TEST_KEY_ANTHROPIC")).unwrap();
        assert_eq!(provider.model_name(), "test-model");
    }

    #[test]
    fn test_create_provider_missing_key() {
        let config = test_config("openai", "SLEUTH_NONEXISTENT_KEY");
        match create_provider(&config) {
            Err(LlmError::AuthFailed { provider }) => {
                assert!(provider.contains("SLEUTH_NONEXISTENT_KEY"));
            }
            Err(other) => panic!("Expected AuthFailed, got {:?}", other),
            Ok(_) => panic!("Expected AuthFailed, got a provider"),
        }
    }

    #[test]
    fn test_create_provider_local_needs_no_key() {
        let mut config = test_config("ollama", "SLEUTH_NONEXISTENT_LOCAL_KEY");
        config.base_url = Some("http://localhost:11434/v1".into());
        assert!(create_provider(&config).is_ok());

        config.base_url = Some("http://127.0.0.1:8000/v1".into());
        assert_eq!(provider_api_key(&config).unwrap(), "local");
    }

    #[test]
    fn test_remote_and_anthropic_still_require_key() {
        let mut config = test_config("openai", "SLEUTH_NONEXISTENT_REMOTE_KEY");
        config.base_url = Some("https://api.example.com/v1".into());
        assert!(matches!(
            provider_api_key(&config),
            Err(LlmError::AuthFailed { .. })
        ));

        let config = test_config("anthropic", "SLEUTH_NONEXISTENT_ANTHROPIC_KEY");
        assert!(matches!(
            create_provider(&config),
            Err(LlmError::AuthFailed { .. })
        ));
    }

    #[test]
    fn test_is_transient() {
        assert!(LlmError::RateLimited { retry_after_secs: 30 }.is_transient());
        assert!(LlmError::Connection { message: "x".into() }.is_transient());
        assert!(LlmError::Timeout { timeout_secs: 30 }.is_transient());
        assert!(!LlmError::AuthFailed { provider: "t".into() }.is_transient());
        assert!(!LlmError::ResponseParse { message: "bad".into() }.is_transient());

        assert!(SearchError::Status { status: 503, body: String::new() }.is_transient());
        assert!(SearchError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!SearchError::Status { status: 403, body: String::new() }.is_transient());
        assert!(!SearchError::NotConfigured { missing: "cx".into() }.is_transient());
    }

    #[test]
    fn test_compute_backoff_exponential() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(compute_exponential_backoff(&config, 0), 1000);
        assert_eq!(compute_exponential_backoff(&config, 1), 2000);
        assert_eq!(compute_exponential_backoff(&config, 2), 4000);
    }

    #[test]
    fn test_compute_backoff_respects_cap() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 3000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(compute_exponential_backoff(&config, 2), 3000);
    }

    #[test]
    fn test_compute_backoff_rate_limit_uses_server_value() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(compute_backoff(&config, 0, Some(30)), 30_000);
        assert_eq!(compute_backoff(&config, 0, None), 1000);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let result = with_retry(&fast_retry(3), || async { Ok::<_, LlmError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_no_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result = with_retry(&fast_retry(3), || {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(LlmError::AuthFailed {
                    provider: "test".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result = with_retry(&fast_retry(3), || {
            let cc = cc.clone();
            async move {
                if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::Connection {
                        message: "flaky".into(),
                    })
                } else {
                    Ok("answer")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result = with_retry(&fast_retry(2), || {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SearchError::Timeout { timeout_secs: 1 })
            }
        })
        .await;
        match result {
            Err(SearchError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, SearchError::Timeout { .. }));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_zero_budget_returns_raw_error() {
        let result = with_retry(&fast_retry(0), || async {
            Err::<(), _>(LlmError::Timeout { timeout_secs: 5 })
        })
        .await;
        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_retrying_provider_wraps_inner() {
        let mock = Arc::new(MockLlmProvider::with_response("ok"));
        mock.queue_error(LlmError::Connection {
            message: "blip".into(),
        });
        let provider = RetryingProvider::new(mock.clone(), fast_retry(1));
        assert_eq!(provider.run("hello").await.unwrap(), "ok");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(provider.model_name(), "mock-model");
    }
}
