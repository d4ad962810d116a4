//! Rate-limit aware request pipeline in front of a [`CompletionProvider`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use docquery_core::{
    Completion, CompletionProvider, CompletionRequest, DocqueryConfig, Error, Result,
};
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sends one logical query, retrying rate-limited attempts with linear backoff.
///
/// Attempt `n + 1` waits `backoff_unit * n` after attempt `n` was rate
/// limited. Every other failure is returned as-is on the first occurrence.
#[derive(Clone)]
pub struct RequestPipeline {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl RequestPipeline {
    /// Creates a pipeline with three attempts and a 60 second backoff unit.
    pub fn new<M: Into<String>>(provider: Arc<dyn CompletionProvider>, model: M) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 500,
            temperature: 0.7,
            max_attempts: 3,
            backoff_unit: Duration::from_secs(60),
        }
    }

    /// Creates a pipeline from the model and retry sections of `config`.
    pub fn from_config(provider: Arc<dyn CompletionProvider>, config: &DocqueryConfig) -> Self {
        Self::new(provider, config.model.model.clone())
            .with_max_tokens(config.model.max_tokens)
            .with_temperature(config.model.temperature)
            .with_max_attempts(config.retry.max_attempts)
            .with_backoff_unit(config.retry.backoff_unit())
    }

    /// Caps the length of each answer.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Total attempts, including the first. Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base wait; retry `n` waits `n` times this.
    #[must_use]
    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    /// Model every request is sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Total attempts per prompt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sends `prompt` without a cancellation source.
    ///
    /// # Errors
    /// See [`Self::complete_with_cancel`].
    pub async fn complete(&self, prompt: &str) -> Result<Completion> {
        self.complete_with_cancel(prompt, &CancellationToken::new())
            .await
    }

    /// Sends `prompt`, retrying while the service reports rate limiting.
    ///
    /// # Errors
    /// - [`Error::RetriesExhausted`] when every attempt was rate limited
    /// - [`Error::Cancelled`] when `cancel` fires before or between attempts
    /// - any terminal provider error, unchanged
    pub async fn complete_with_cancel(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let request = CompletionRequest::new(self.model.clone(), prompt)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let started = Instant::now();
            debug!(attempt, provider = self.provider.name(), "sending completion request");
            let error = match self.provider.complete(&request).await {
                Ok(completion) => {
                    info!(
                        attempt,
                        provider = %completion.provider,
                        tokens = completion.tokens_used.total(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "completion received"
                    );
                    return Ok(completion);
                }
                Err(error) if error.is_retryable() => error,
                Err(error) => return Err(error),
            };

            if attempt >= self.max_attempts {
                warn!(attempts = attempt, %error, "giving up after repeated rate limiting");
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            let wait = self.backoff_unit * attempt;
            warn!(
                attempt,
                wait_secs = wait.as_secs(),
                "rate limit hit, backing off before retrying"
            );
            select! {
                () = sleep(wait) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }
}
