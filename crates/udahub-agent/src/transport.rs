//! Transport abstraction for sub-agent model calls

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use udahub_ai::{
    Completion, CompletionOptions, Context, Error, LlmProvider, Model, OpenAIProvider, Result,
};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient failures that surface only as text (wrapped provider errors,
/// proxies that rewrite status codes).
static RETRYABLE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(429|500|502|503|504)\b|rate.?limit|timed?.?out|connection (reset|refused|closed)|overloaded").ok()
});

/// Check if an error message describes a transient failure
pub fn is_retryable_error(error: &str) -> bool {
    RETRYABLE_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(error))
}

/// Sends one completion request on behalf of a sub-agent
#[async_trait]
pub trait Transport: Send + Sync {
    async fn complete(
        &self,
        context: &Context,
        options: &CompletionOptions,
        cancel: CancellationToken,
    ) -> Result<Completion>;
}

/// Direct provider transport - calls the LLM API with retries
pub struct ProviderTransport {
    provider: Arc<dyn LlmProvider>,
    model: Model,
    retry_config: RetryConfig,
}

impl ProviderTransport {
    /// Create a transport over any provider
    pub fn new(provider: Arc<dyn LlmProvider>, model: Model) -> Self {
        Self {
            provider,
            model,
            retry_config: RetryConfig::default(),
        }
    }

    /// Create an OpenAI-compatible transport with a specific API key
    pub fn openai(model: Model, api_key: impl Into<String>) -> Self {
        Self::new(Arc::new(OpenAIProvider::new(api_key)), model)
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }
}

#[async_trait]
impl Transport for ProviderTransport {
    async fn complete(
        &self,
        context: &Context,
        options: &CompletionOptions,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Aborted);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                r = self.provider.complete(&self.model, context, options) => r,
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    let error_msg = e.to_string();
                    let retryable = e.is_retryable() || is_retryable_error(&error_msg);

                    if attempt < self.retry_config.max_retries && retryable {
                        let delay = match &e {
                            Error::RateLimited {
                                retry_after: Some(secs),
                            } => Duration::from_secs(*secs).min(self.retry_config.max_delay),
                            _ => self.retry_config.delay_for_attempt(attempt),
                        };
                        tracing::warn!(
                            "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt + 1,
                            self.retry_config.max_retries + 1,
                            error_msg,
                            delay
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(e);
                }
            }
        }
    }
}
